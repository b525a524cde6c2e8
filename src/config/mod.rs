//! Layered build-setup configuration.
//!
//! A [`WorkspaceConfig`] wraps a complete [`BuildSetupConfig`] together with
//! the workspace root, the manifest filename, and the package-description
//! sentinel string the resolver's package-root search looks for. The
//! `BuildSetupConfig` itself is assembled by [`ConfigManager`](manager::ConfigManager)
//! from four layers, merged in order so later layers win on scalar fields:
//!
//! 1. built-in defaults
//! 2. an optional on-disk `build-setup.toml`
//! 3. `SEMINDEX_*` environment variables
//! 4. programmatic overrides passed to `init`
//!
//! # Examples
//!
//! ```
//! use semindex_core::config::{init_config, WorkspaceConfig};
//! use semindex_core::config::partial::PartialBuildSetupConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> semindex_core::Result<()> {
//! let ws: WorkspaceConfig = init_config(PathBuf::from("/tmp/ws"), None)?;
//! assert!(ws.build_setup.max_concurrent_tasks > 0);
//! # Ok(())
//! # }
//! ```

pub mod environment;
pub mod manager;
pub mod partial;
pub mod source;

use partial::{BuildConfiguration, LanguageFlags, PartialBuildSetupConfig, WorkspaceType};
use source::{DefaultsSource, EnvSource, FileSource, OverridesSource};
use std::path::PathBuf;

pub use environment::{EnvironmentProvider, SystemEnvironmentProvider, TestEnvironmentProvider};
pub use manager::{ConfigError, ConfigManager};

/// The default manifest filename the resolver looks for while walking up
/// from a file's path.
pub const DEFAULT_MANIFEST_FILENAME: &str = "Package.semindex";

/// Sentinel string a manifest must contain to be recognized as a package
/// description, distinguishing it from an unrelated file of the same name.
pub const DEFAULT_PACKAGE_DESCRIPTION_SENTINEL: &str = "semindex-package";

/// Complete, defaulted build-setup configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSetupConfig {
    /// Debug or release.
    pub configuration: BuildConfiguration,
    /// How the workspace's build description is obtained.
    pub default_workspace_type: WorkspaceType,
    /// Scratch directory for build artifacts, when configured.
    pub scratch_path: Option<PathBuf>,
    /// Extra per-language compiler and linker flags.
    pub flags: LanguageFlags,
    /// Scheduler concurrency budget.
    pub max_concurrent_tasks: usize,
}

/// A workspace's full configuration: its root, manifest addressing, and
/// resolved build-setup.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Workspace root directory, as passed to `init`.
    pub root: PathBuf,
    /// Filename the package-root search looks for (e.g. `Package.semindex`).
    pub manifest_filename: String,
    /// Sentinel string a candidate manifest must contain to be accepted.
    pub package_description_sentinel: String,
    /// The resolved build-setup configuration.
    pub build_setup: BuildSetupConfig,
}

impl WorkspaceConfig {
    /// Scheduler concurrency budget for this workspace.
    pub fn concurrency_budget(&self) -> usize {
        self.build_setup.max_concurrent_tasks
    }
}

/// Load a workspace's configuration by merging defaults, an optional
/// `build-setup.toml` under `root`, `SEMINDEX_*` environment variables, and
/// `overrides`, in that order.
pub fn init_config(
    root: PathBuf,
    overrides: Option<PartialBuildSetupConfig>,
) -> crate::Result<WorkspaceConfig> {
    if root.as_os_str().is_empty() {
        return Err(crate::error::CoreError::config(
            "workspace root must not be empty",
        ));
    }

    let manager = ConfigManager::new()
        .add_source(Box::new(DefaultsSource::new(
            PartialBuildSetupConfig::default(),
        )))
        .add_source(Box::new(FileSource::new(root.join("build-setup.toml"))))
        .add_source(Box::new(EnvSource::new()))
        .add_source(Box::new(OverridesSource::new(
            overrides.unwrap_or_default(),
        )));

    let build_setup = manager.load_complete().map_err(crate::error::CoreError::from)?;

    Ok(WorkspaceConfig {
        root,
        manifest_filename: DEFAULT_MANIFEST_FILENAME.to_string(),
        package_description_sentinel: DEFAULT_PACKAGE_DESCRIPTION_SENTINEL.to_string(),
        build_setup,
    })
}
