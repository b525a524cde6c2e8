//! Error types for the semantic-index core.
//!
//! This module defines the `CoreError` enum covering the failure modes
//! described by the resolver, scheduler, and index manager: manifest
//! discovery, package loading, symlink resolution, and target lookup.
//!
//! Per-operation errors never tear down the [`crate::core::index_manager::SemanticIndexManager`];
//! they are logged and localized to the file or task that triggered them.
//! Only construction-time errors (`NoManifest`, `CannotDetermineHostToolchain`)
//! are fatal to a workspace.
use std::path::PathBuf;
use thiserror::Error;

/// All possible errors produced by the core.
///
/// Each variant carries enough context to log a useful diagnostic; see
/// [`CoreError::category`] for the coarse classification hosts use when they
/// need to map an error to an exit code or a user-facing bucket.
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O operation failed during file system access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No package manifest was found while walking up from the workspace root.
    #[error("no package manifest found under {0}")]
    NoManifest(PathBuf),

    /// The host toolchain could not be determined for this workspace.
    #[error("cannot determine host toolchain")]
    CannotDetermineHostToolchain,

    /// Loading the package graph failed; prior resolver state is preserved.
    #[error("package load failed: {message}")]
    PackageLoad {
        /// Description of the underlying failure reported by the package loader.
        message: String,
    },

    /// Resolving a symlink for a requested path failed.
    #[error("symlink resolution failed for {path}: {message}")]
    SymlinkResolution {
        /// The path whose symlink could not be resolved.
        path: PathBuf,
        /// Description of the underlying failure.
        message: String,
    },

    /// A file has no owning target and was dropped from the current index pass.
    #[error("no target owns file {0}")]
    MissingTarget(PathBuf),

    /// Invalid or missing configuration value.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Catch-all wrapping an opaque failure from a collaborator (package loader,
    /// subprocess runner) that does not warrant its own variant.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of an error, for hosts that bucket failures without
/// matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Local file-system access failed.
    Io,
    /// Workspace construction failed; fatal to that workspace.
    Construction,
    /// A reload attempt failed; prior state is preserved.
    Reload,
    /// A single file query could not be served.
    Query,
    /// Configuration was invalid.
    Config,
    /// Uncategorized.
    Other,
}

impl CoreError {
    /// Build a [`CoreError::PackageLoad`] from any displayable message.
    pub fn package_load(message: impl Into<String>) -> Self {
        CoreError::PackageLoad {
            message: message.into(),
        }
    }

    /// Build a [`CoreError::SymlinkResolution`] error.
    pub fn symlink_resolution(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CoreError::SymlinkResolution {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Build a [`CoreError::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        CoreError::Config {
            message: message.into(),
        }
    }

    /// Coarse category used for logging and host-side exit-code mapping.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoreError::Io(_) => ErrorCategory::Io,
            CoreError::NoManifest(_) | CoreError::CannotDetermineHostToolchain => {
                ErrorCategory::Construction
            }
            CoreError::PackageLoad { .. } => ErrorCategory::Reload,
            CoreError::SymlinkResolution { .. } | CoreError::MissingTarget(_) => {
                ErrorCategory::Query
            }
            CoreError::Config { .. } => ErrorCategory::Config,
            CoreError::Other(_) => ErrorCategory::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creation() {
        let error = CoreError::config("missing scratch path");
        assert!(matches!(error, CoreError::Config { .. }));
        assert_eq!(
            error.to_string(),
            "configuration error: missing scratch path"
        );
    }

    #[test]
    fn test_package_load_error_creation() {
        let error = CoreError::package_load("manifest parse failure");
        assert!(matches!(error, CoreError::PackageLoad { .. }));
        assert_eq!(error.category(), ErrorCategory::Reload);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let core_error: CoreError = io_error.into();
        assert!(matches!(core_error, CoreError::Io(_)));
        assert_eq!(core_error.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_construction_errors_are_fatal_category() {
        assert_eq!(
            CoreError::NoManifest(PathBuf::from("/tmp/ws")).category(),
            ErrorCategory::Construction
        );
        assert_eq!(
            CoreError::CannotDetermineHostToolchain.category(),
            ErrorCategory::Construction
        );
    }
}
