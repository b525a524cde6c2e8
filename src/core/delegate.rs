//! Weakly-held build-system delegate (observer) bus.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

/// Notifications the build-settings resolver and index manager publish to
/// an interested host. Held weakly: a delegate's lifetime is never
/// prolonged by being registered here.
#[async_trait]
pub trait BuildSystemDelegate: Send + Sync {
    /// Build settings changed for the given files (e.g. after a reload).
    async fn file_build_settings_changed(&self, files: HashSet<String>);

    /// Dependency graph for the given files was updated (e.g. after a
    /// debounced fan-out from a changed source file).
    async fn file_dependencies_updated(&self, files: HashSet<String>);

    /// Whether any URI is handled changed (targets appeared or disappeared).
    async fn file_handling_capability_changed(&self);
}

/// Holds a single delegate by weak reference and fans out notifications to
/// it when present.
#[derive(Clone, Default)]
pub struct DelegateBus {
    delegate: Arc<Mutex<Option<Weak<dyn BuildSystemDelegate>>>>,
}

impl DelegateBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delegate. Does not take ownership; if every strong
    /// reference to it is dropped elsewhere, notifications silently stop.
    pub fn set_delegate(&self, delegate: &Arc<dyn BuildSystemDelegate>) {
        *self.delegate.lock().unwrap() = Some(Arc::downgrade(delegate));
    }

    /// Clear the registered delegate.
    pub fn clear_delegate(&self) {
        *self.delegate.lock().unwrap() = None;
    }

    fn upgrade(&self) -> Option<Arc<dyn BuildSystemDelegate>> {
        self.delegate.lock().unwrap().as_ref()?.upgrade()
    }

    /// Notify `file_build_settings_changed`, if a delegate is still alive.
    pub async fn notify_build_settings_changed(&self, files: HashSet<String>) {
        if let Some(d) = self.upgrade() {
            d.file_build_settings_changed(files).await;
        }
    }

    /// Notify `file_dependencies_updated`, if a delegate is still alive.
    pub async fn notify_dependencies_updated(&self, files: HashSet<String>) {
        if let Some(d) = self.upgrade() {
            d.file_dependencies_updated(files).await;
        }
    }

    /// Notify `file_handling_capability_changed`, if a delegate is still alive.
    pub async fn notify_handling_capability_changed(&self) {
        if let Some(d) = self.upgrade() {
            d.file_handling_capability_changed().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct RecordingDelegate {
        settings_changed: AsyncMutex<Vec<HashSet<String>>>,
        capability_changed: AsyncMutex<u32>,
    }

    #[async_trait]
    impl BuildSystemDelegate for RecordingDelegate {
        async fn file_build_settings_changed(&self, files: HashSet<String>) {
            self.settings_changed.lock().await.push(files);
        }
        async fn file_dependencies_updated(&self, _files: HashSet<String>) {}
        async fn file_handling_capability_changed(&self) {
            *self.capability_changed.lock().await += 1;
        }
    }

    #[tokio::test]
    async fn test_notifies_live_delegate() {
        let bus = DelegateBus::new();
        let concrete = Arc::new(RecordingDelegate::default());
        let as_trait: Arc<dyn BuildSystemDelegate> = Arc::clone(&concrete) as Arc<dyn BuildSystemDelegate>;
        bus.set_delegate(&as_trait);

        let mut files = HashSet::new();
        files.insert("a.swift".to_string());
        bus.notify_build_settings_changed(files.clone()).await;
        bus.notify_handling_capability_changed().await;

        assert_eq!(concrete.settings_changed.lock().await.len(), 1);
        assert_eq!(*concrete.capability_changed.lock().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_delegate_is_silently_skipped() {
        let bus = DelegateBus::new();
        {
            let concrete = Arc::new(RecordingDelegate::default());
            let as_trait: Arc<dyn BuildSystemDelegate> = concrete as Arc<dyn BuildSystemDelegate>;
            bus.set_delegate(&as_trait);
        }
        // Every strong reference is now dropped; the weak upgrade fails and
        // the notification is silently skipped rather than panicking.
        bus.notify_handling_capability_changed().await;
    }
}
