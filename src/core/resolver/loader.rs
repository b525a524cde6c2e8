//! Package loader seam: loads a workspace's module graph from its manifest.
//!
//! Production workspaces load this from the configured package manifest
//! via an external toolchain; tests and the in-process demo substitute
//! [`FakePackageLoader`] so the resolver, scheduler, and index manager can
//! be exercised without a real toolchain.

use crate::config::BuildSetupConfig;
use crate::error::CoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One target as reported by the package loader, before topological
/// ranking (which the resolver computes from `depends_on`).
#[derive(Debug, Clone)]
pub struct TargetDescription {
    /// Stable target name.
    pub target_id: String,
    /// Build-destination discriminator.
    pub run_destination_id: String,
    /// Target ids this target depends on.
    pub depends_on: Vec<String>,
    /// Absolute source file paths this target lists.
    pub sources: Vec<PathBuf>,
    /// This target's source root.
    pub source_root: PathBuf,
    /// Base compiler arguments per source file.
    pub compile_args: HashMap<PathBuf, Vec<String>>,
}

/// Result of a successful load, before the resolver assembles its lookup maps.
#[derive(Debug, Clone, Default)]
pub struct LoadedPackage {
    /// Every target the manifest describes.
    pub targets: Vec<TargetDescription>,
    /// Interpreter flags for the owning package, used when serving build
    /// settings for the manifest sentinel.
    pub interpreter_flags: Vec<String>,
}

/// Loads a workspace's package graph.
#[async_trait]
pub trait PackageLoader: Send + Sync {
    /// Load the package rooted at `workspace_root` using `build_setup`.
    ///
    /// `is_for_index_build` mirrors the resolver's index-only mode: when
    /// true, unresolved dependencies may be fetched rather than requiring
    /// previously pinned versions.
    async fn load(
        &self,
        workspace_root: &Path,
        build_setup: &BuildSetupConfig,
        is_for_index_build: bool,
    ) -> Result<LoadedPackage, CoreError>;
}

/// In-memory package loader for tests and the demo binary: returns a
/// fixed [`LoadedPackage`] regardless of arguments, or a configured error.
#[derive(Clone, Default)]
pub struct FakePackageLoader {
    result: std::sync::Arc<std::sync::Mutex<Result<LoadedPackage, String>>>,
}

impl FakePackageLoader {
    /// Create a loader that always succeeds with `package`.
    pub fn with_package(package: LoadedPackage) -> Self {
        Self {
            result: std::sync::Arc::new(std::sync::Mutex::new(Ok(package))),
        }
    }

    /// Create a loader that always fails with `message`.
    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            result: std::sync::Arc::new(std::sync::Mutex::new(Err(message.into()))),
        }
    }

    /// Replace the package this loader returns, for tests that reload
    /// mid-scenario.
    pub fn set_package(&self, package: LoadedPackage) {
        *self.result.lock().unwrap() = Ok(package);
    }

    /// Make this loader fail with `message` from now on, for tests that
    /// exercise a resolver's reload-failure path mid-scenario.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.result.lock().unwrap() = Err(message.into());
    }
}

#[async_trait]
impl PackageLoader for FakePackageLoader {
    async fn load(
        &self,
        _workspace_root: &Path,
        _build_setup: &BuildSetupConfig,
        _is_for_index_build: bool,
    ) -> Result<LoadedPackage, CoreError> {
        match &*self.result.lock().unwrap() {
            Ok(package) => Ok(package.clone()),
            Err(message) => Err(CoreError::package_load(message.clone())),
        }
    }
}
