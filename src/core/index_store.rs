//! Update-index-store task abstraction: invokes the external indexer tool
//! for a single file using its resolved build settings.

use crate::core::resolver::{BuildSettingsResolver, ConfiguredTarget, FileBuildSettings};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Result of indexing a single file.
#[derive(Debug, Clone)]
pub struct IndexUpdateResult {
    /// The file that was indexed.
    pub file: PathBuf,
    /// Whether the indexer tool reported success.
    pub succeeded: bool,
    /// Captured diagnostic output, if any.
    pub message: Option<String>,
}

/// Invokes the external indexer tool for one file's resolved build
/// settings. Does not itself read or write the on-disk index database;
/// it only launches the external tool that does.
#[async_trait]
pub trait IndexStoreHandle: Send + Sync {
    /// Update the index store entry for `file`, built with `settings`.
    async fn update(&self, file: &Path, settings: &FileBuildSettings) -> IndexUpdateResult;
}

/// Real handle: shells out to the indexer binary. The command line mirrors
/// the preparation runner's toolchain invocation but is intentionally left
/// generic here; hosts that need the concrete indexer binary name supply it
/// through configuration rather than this core hard-coding one.
pub struct ExternalIndexStore {
    indexer_binary: String,
}

impl ExternalIndexStore {
    /// Construct a handle that shells out to `indexer_binary`.
    pub fn new(indexer_binary: impl Into<String>) -> Self {
        Self {
            indexer_binary: indexer_binary.into(),
        }
    }
}

#[async_trait]
impl IndexStoreHandle for ExternalIndexStore {
    async fn update(&self, file: &Path, settings: &FileBuildSettings) -> IndexUpdateResult {
        let mut command = tokio::process::Command::new(&self.indexer_binary);
        command
            .current_dir(&settings.working_directory)
            .args(&settings.arguments);
        match command.status().await {
            Ok(status) if status.success() => {
                log::debug!("index-store: updated {}", file.display());
                IndexUpdateResult {
                    file: file.to_path_buf(),
                    succeeded: true,
                    message: None,
                }
            }
            Ok(status) => {
                log::debug!("index-store: {} exited {:?} for {}", self.indexer_binary, status.code(), file.display());
                IndexUpdateResult {
                    file: file.to_path_buf(),
                    succeeded: false,
                    message: Some(format!("exited with {:?}", status.code())),
                }
            }
            Err(err) => {
                log::error!("index-store: failed to spawn {}: {}", self.indexer_binary, err);
                IndexUpdateResult {
                    file: file.to_path_buf(),
                    succeeded: false,
                    message: Some(err.to_string()),
                }
            }
        }
    }
}

/// In-memory store for tests and the demo binary: records every file it
/// was asked to update and reports a scripted outcome.
#[derive(Clone, Default)]
pub struct FakeIndexStore {
    updated: Arc<Mutex<Vec<PathBuf>>>,
    should_fail: Arc<std::sync::atomic::AtomicBool>,
}

impl FakeIndexStore {
    /// A store whose every `update` call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every `update` call reports failure.
    pub fn always_failing() -> Self {
        let store = Self::default();
        store.should_fail.store(true, std::sync::atomic::Ordering::SeqCst);
        store
    }

    /// Files this store was asked to update, in call order.
    pub fn updated_files(&self) -> Vec<PathBuf> {
        self.updated.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexStoreHandle for FakeIndexStore {
    async fn update(&self, file: &Path, _settings: &FileBuildSettings) -> IndexUpdateResult {
        self.updated.lock().unwrap().push(file.to_path_buf());
        let succeeded = !self.should_fail.load(std::sync::atomic::Ordering::SeqCst);
        IndexUpdateResult {
            file: file.to_path_buf(),
            succeeded,
            message: if succeeded { None } else { Some("fake failure".to_string()) },
        }
    }
}

/// Resolve build settings for `file` under `target` and run the index
/// store update for it. Returns `None` if the resolver cannot produce
/// settings (e.g. `MissingTarget`), in which case the caller should log
/// and drop the file from the current pass rather than retry.
pub async fn update_index_store_for_file(
    resolver: &BuildSettingsResolver,
    store: &dyn IndexStoreHandle,
    file: &Path,
    target: &ConfiguredTarget,
    language: &str,
) -> Option<IndexUpdateResult> {
    match resolver.build_settings(file, target, language) {
        Ok(settings) => Some(store.update(file, &settings).await),
        Err(err) => {
            log::error!("index-store: no build settings for {}: {}", file.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_store_records_updated_files() {
        let store = FakeIndexStore::new();
        let settings = FileBuildSettings {
            arguments: vec!["indexer".to_string()],
            working_directory: PathBuf::from("/tmp/ws"),
        };
        let result = store.update(Path::new("/tmp/ws/a.swift"), &settings).await;
        assert!(result.succeeded);
        assert_eq!(store.updated_files(), vec![PathBuf::from("/tmp/ws/a.swift")]);
    }

    #[tokio::test]
    async fn test_fake_store_reports_configured_failure() {
        let store = FakeIndexStore::always_failing();
        let settings = FileBuildSettings {
            arguments: vec![],
            working_directory: PathBuf::from("/tmp/ws"),
        };
        let result = store.update(Path::new("/tmp/ws/a.swift"), &settings).await;
        assert!(!result.succeeded);
        assert!(result.message.is_some());
    }
}
