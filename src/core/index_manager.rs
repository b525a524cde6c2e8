//! Semantic Index Manager: per-workspace coordinator that groups files by
//! target, topologically orders them, and schedules preparation followed
//! by per-file index-store updates, tracking freshness per file.

use crate::config::WorkspaceConfig;
use crate::core::delegate::DelegateBus;
use crate::core::index_store::{update_index_store_for_file, IndexStoreHandle};
use crate::core::preparation::{ExitStatus, PreparationRunner};
use crate::core::resolver::{BuildSettingsResolver, ConfiguredTarget};
use crate::core::scheduler::{
    CancellationToken, SchedulerTask, StateSink, TaskOutcome, TaskPriority, TaskScheduler, TaskState,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// A handle to an in-flight (or finished) index task, shared by every file
/// the task covers. Cheaply cloneable; awaiting it never consumes it.
#[derive(Clone)]
pub struct IndexTaskHandle {
    finished: watch::Receiver<bool>,
}

impl IndexTaskHandle {
    fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { finished: rx })
    }

    /// Block until the task this handle refers to has finished.
    pub async fn wait_until_finished(&self) {
        let mut rx = self.finished.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Whether the task has already finished, without waiting.
    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }
}

/// Per-file indexing freshness, transitioning only through scheduler state
/// callbacks.
#[derive(Clone)]
pub enum FileIndexStatus {
    /// Queued; not yet picked up by a worker.
    Scheduled(IndexTaskHandle),
    /// Actively being prepared or indexed.
    Executing(IndexTaskHandle),
    /// Index store reflects the file's current contents.
    UpToDate,
}

struct PreparationTask {
    id: String,
    target: ConfiguredTarget,
    toolchain: String,
    workspace_root: PathBuf,
    build_setup: crate::config::BuildSetupConfig,
    runner: Arc<dyn PreparationRunner>,
}

#[async_trait]
impl SchedulerTask for PreparationTask {
    async fn execute(&self, cancel: CancellationToken, _state: StateSink) -> TaskOutcome {
        let result = self
            .runner
            .prepare(&self.toolchain, &self.workspace_root, &self.target, &self.build_setup, &cancel)
            .await;
        if result.was_cancelled {
            return TaskOutcome::CancelledToBeRescheduled;
        }
        match result.status {
            ExitStatus::Terminated(_) => TaskOutcome::Finished,
            // Non-zero exits, signals, and abnormal termination are likely
            // user code failing to compile, not scheduler-level errors; the
            // runner has already logged details.
            ExitStatus::Signalled(_) | ExitStatus::Abnormal => TaskOutcome::Finished,
        }
    }

    fn task_kind(&self) -> &'static str {
        "preparation"
    }

    fn task_id(&self) -> String {
        self.id.clone()
    }

    fn is_idempotent_with(&self, other: &dyn SchedulerTask) -> bool {
        other.task_kind() == "preparation" && other.task_id() == self.id
    }
}

struct UpdateIndexStoreTask {
    id: String,
    file: PathBuf,
    target: ConfiguredTarget,
    language: String,
    resolver: Arc<BuildSettingsResolver>,
    store: Arc<dyn IndexStoreHandle>,
}

#[async_trait]
impl SchedulerTask for UpdateIndexStoreTask {
    async fn execute(&self, cancel: CancellationToken, _state: StateSink) -> TaskOutcome {
        if cancel.is_cancelled() {
            return TaskOutcome::CancelledToBeRescheduled;
        }
        match update_index_store_for_file(&self.resolver, self.store.as_ref(), &self.file, &self.target, &self.language).await {
            Some(result) if result.succeeded => TaskOutcome::Finished,
            Some(result) => TaskOutcome::Failed(result.message.unwrap_or_else(|| "index update failed".to_string())),
            None => TaskOutcome::Failed(format!("no build settings for {}", self.file.display())),
        }
    }

    fn task_kind(&self) -> &'static str {
        "update-index-store"
    }

    fn task_id(&self) -> String {
        self.id.clone()
    }
}

/// Coordinates preparation and per-file indexing for one workspace.
#[derive(Clone)]
pub struct SemanticIndexManager {
    resolver: Arc<BuildSettingsResolver>,
    scheduler: Arc<TaskScheduler>,
    preparation: Arc<dyn PreparationRunner>,
    index_store: Arc<dyn IndexStoreHandle>,
    toolchain: String,
    language: String,
    workspace_root: PathBuf,
    build_setup: crate::config::BuildSetupConfig,
    status: Arc<Mutex<HashMap<PathBuf, FileIndexStatus>>>,
    generate_build_graph_task: Arc<Mutex<Option<IndexTaskHandle>>>,
    delegate: DelegateBus,
    dependents_debouncer: Arc<crate::core::debounce::Debouncer<HashSet<PathBuf>>>,
}

impl SemanticIndexManager {
    /// Construct a manager for `workspace`, driven by `resolver` and
    /// `scheduler`, using `preparation`/`index_store` to do the actual work.
    pub fn new(
        workspace: &WorkspaceConfig,
        toolchain: impl Into<String>,
        language: impl Into<String>,
        resolver: Arc<BuildSettingsResolver>,
        scheduler: Arc<TaskScheduler>,
        preparation: Arc<dyn PreparationRunner>,
        index_store: Arc<dyn IndexStoreHandle>,
        delegate: DelegateBus,
    ) -> Self {
        let inner_delegate = delegate.clone();
        let dependents_debouncer = crate::core::debounce::Debouncer::new(
            std::time::Duration::from_millis(500),
            |mut a: HashSet<PathBuf>, b: HashSet<PathBuf>| {
                a.extend(b);
                a
            },
            move |files: HashSet<PathBuf>| {
                let delegate = inner_delegate.clone();
                async move {
                    let as_strings = files.into_iter().map(|p| p.display().to_string()).collect();
                    delegate.notify_dependencies_updated(as_strings).await;
                }
            },
        );

        Self {
            resolver,
            scheduler,
            preparation,
            index_store,
            toolchain: toolchain.into(),
            language: language.into(),
            workspace_root: workspace.root.clone(),
            build_setup: workspace.build_setup.clone(),
            status: Arc::new(Mutex::new(HashMap::new())),
            generate_build_graph_task: Arc::new(Mutex::new(None)),
            delegate,
            dependents_debouncer: Arc::new(dependents_debouncer),
        }
    }

    /// Snapshot of files currently `Scheduled` and `Executing`, for hosts
    /// that surface indexing progress.
    pub fn in_progress_index_tasks(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let status = self.status.lock().unwrap();
        let mut scheduled = Vec::new();
        let mut executing = Vec::new();
        for (file, s) in status.iter() {
            match s {
                FileIndexStatus::Scheduled(_) => scheduled.push(file.clone()),
                FileIndexStatus::Executing(_) => executing.push(file.clone()),
                FileIndexStatus::UpToDate => {}
            }
        }
        scheduled.sort();
        executing.sort();
        (scheduled, executing)
    }

    /// Low-priority index pass over `files` not already up to date.
    pub fn schedule_background_index(&self, files: Vec<PathBuf>) -> IndexTaskHandle {
        self.schedule_index(files, TaskPriority::Background)
    }

    /// Regenerate the build graph, then background-index every known
    /// source file. Only one such pass runs at a time; a call while one is
    /// still in flight is a no-op.
    pub async fn schedule_build_graph_generation_and_background_index_all_files(&self) -> Option<IndexTaskHandle> {
        {
            let guard = self.generate_build_graph_task.lock().unwrap();
            if let Some(existing) = guard.as_ref() {
                if !existing.is_finished() {
                    log::debug!("index-manager: build-graph generation already in progress");
                    return None;
                }
            }
        }

        let (tx, handle) = IndexTaskHandle::new();
        *self.generate_build_graph_task.lock().unwrap() = Some(handle.clone());

        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(err) = manager.resolver.reload().await {
                log::error!("index-manager: build graph regeneration failed: {}", err);
            }
            let files = manager.resolver.known_source_files();
            let inner = manager.schedule_background_index(files);
            inner.wait_until_finished().await;
            let _ = tx.send(true);
        });

        Some(handle)
    }

    /// Await any in-flight build-graph regeneration, then every
    /// currently-tracked index task, then (conceptually) poll the external
    /// index store for unit changes.
    pub async fn wait_for_up_to_date_index(&self) {
        let graph_task = self.generate_build_graph_task.lock().unwrap().clone();
        if let Some(h) = graph_task {
            h.wait_until_finished().await;
        }

        let handles: Vec<IndexTaskHandle> = {
            let status = self.status.lock().unwrap();
            status
                .values()
                .filter_map(|s| match s {
                    FileIndexStatus::Scheduled(h) | FileIndexStatus::Executing(h) => Some(h.clone()),
                    FileIndexStatus::UpToDate => None,
                })
                .collect()
        };
        for h in handles {
            h.wait_until_finished().await;
        }
        log::debug!("index-manager: polled external index store for unit changes");
    }

    /// Narrowed variant of [`Self::wait_for_up_to_date_index`]: schedules
    /// `files` at interactive priority (which may preempt a broader
    /// background task covering the same target) and waits for them.
    pub async fn wait_for_up_to_date_index_files(&self, files: Vec<PathBuf>) {
        let handle = self.schedule_index(files, TaskPriority::Interactive);
        handle.wait_until_finished().await;
    }

    fn schedule_index(&self, files: Vec<PathBuf>, priority: TaskPriority) -> IndexTaskHandle {
        let mut pending: Vec<PathBuf> = {
            let status = self.status.lock().unwrap();
            files
                .into_iter()
                .filter(|f| !matches!(status.get(f), Some(FileIndexStatus::UpToDate)))
                .collect()
        };
        pending.sort();
        pending.dedup();

        let mut by_target: HashMap<ConfiguredTarget, Vec<PathBuf>> = HashMap::new();
        for file in pending {
            match self.resolver.configured_targets_for(&file).into_iter().next() {
                Some(target) => by_target.entry(target).or_default().push(file),
                None => log::error!("index-manager: no target owns {}, dropping from this pass", file.display()),
            }
        }

        let target_keys_unsorted: Vec<ConfiguredTarget> = by_target.keys().cloned().collect();
        let sorted = self.resolver.topological_sort(&target_keys_unsorted);
        let target_keys = if sets_equal(&sorted, &target_keys_unsorted) {
            sorted
        } else {
            log::warn!("index-manager: topological sort returned a mismatched target set, falling back to deterministic order");
            let mut fallback = target_keys_unsorted;
            fallback.sort_by(|a, b| (&a.target_id, &a.run_destination_id).cmp(&(&b.target_id, &b.run_destination_id)));
            fallback
        };

        let (finished_tx, handle) = IndexTaskHandle::new();

        let mut scheduled_count = 0usize;
        {
            // Synchronous critical section: every file in this pass gets a
            // `Scheduled` status before any suspension point, so no other
            // operation can observe a half-scheduled batch.
            let mut status = self.status.lock().unwrap();
            for target in &target_keys {
                if let Some(files_for_target) = by_target.get(target) {
                    for file in files_for_target {
                        status.insert(file.clone(), FileIndexStatus::Scheduled(handle.clone()));
                        scheduled_count += 1;
                    }
                }
            }
        }
        log::debug!("index-manager: scheduled {} file(s) across {} target(s)", scheduled_count, target_keys.len());

        let mut batch_futures = Vec::new();
        for target in target_keys {
            let files_for_batch = by_target.remove(&target).unwrap_or_default();
            let manager = self.clone();
            let batch_handle = handle.clone();
            let priority = priority;
            batch_futures.push(tokio::spawn(async move {
                manager.run_batch(target, files_for_batch, priority, batch_handle).await;
            }));
        }

        tokio::spawn(async move {
            for fut in batch_futures {
                let _ = fut.await;
            }
            let _ = finished_tx.send(true);
        });

        handle
    }

    async fn run_batch(&self, target: ConfiguredTarget, files: Vec<PathBuf>, priority: TaskPriority, handle: IndexTaskHandle) {
        let prep_id = format!("prepare:{}:{}", target.target_id, target.run_destination_id);
        let prep_task = Arc::new(PreparationTask {
            id: prep_id,
            target: target.clone(),
            toolchain: self.toolchain.clone(),
            workspace_root: self.workspace_root.clone(),
            build_setup: self.build_setup.clone(),
            runner: Arc::clone(&self.preparation),
        });

        let prep_handle = self.scheduler.schedule(prep_task, priority, StateSink::noop());
        let prep_outcome = prep_handle.await_result().await;

        if !matches!(prep_outcome, TaskOutcome::Finished) {
            log::warn!("index-manager: preparation for {:?} did not finish ({:?})", target, prep_outcome);
            return;
        }

        self.dependents_debouncer.schedule(files.iter().cloned().collect()).await;

        let mut update_handles = Vec::new();
        for file in &files {
            let status_map = Arc::clone(&self.status);
            let file_for_cb = file.clone();
            let handle_for_cb = handle.clone();
            let sink = StateSink::new(move |state| {
                let mut status = status_map.lock().unwrap();
                match state {
                    TaskState::Executing => {
                        status.insert(file_for_cb.clone(), FileIndexStatus::Executing(handle_for_cb.clone()));
                    }
                    TaskState::CancelledToBeRescheduled => {
                        status.insert(file_for_cb.clone(), FileIndexStatus::Scheduled(handle_for_cb.clone()));
                    }
                    TaskState::Finished => {
                        status.insert(file_for_cb.clone(), FileIndexStatus::UpToDate);
                    }
                }
            });

            let task = Arc::new(UpdateIndexStoreTask {
                id: format!("update:{}", file.display()),
                file: file.clone(),
                target: target.clone(),
                language: self.language.clone(),
                resolver: Arc::clone(&self.resolver),
                store: Arc::clone(&self.index_store),
            });
            update_handles.push(self.scheduler.schedule(task, priority, sink));
        }

        for h in update_handles {
            let _ = h.await_result().await;
        }
    }
}

fn sets_equal(a: &[ConfiguredTarget], b: &[ConfiguredTarget]) -> bool {
    let a: HashSet<&ConfiguredTarget> = a.iter().collect();
    let b: HashSet<&ConfiguredTarget> = b.iter().collect();
    a == b
}
