//! Bookkeeping for tasks currently executing on the scheduler.

use super::task::{CancellationToken, SchedulerTask, TaskPriority};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Snapshot of a task the scheduler has handed to a worker.
#[derive(Clone)]
pub struct ActiveTask {
    /// The task's own identifier.
    pub task_id: String,
    /// Task kind, for logging.
    pub task_kind: &'static str,
    /// Priority at dispatch time.
    pub priority: TaskPriority,
    /// When the worker began executing this task.
    pub started_at: std::time::Instant,
    /// Cancellation flag the scheduler can flip to reschedule this task.
    pub cancel: CancellationToken,
    /// The running task itself, so a newly-arriving task can be checked
    /// against it via [`SchedulerTask::is_idempotent_with`].
    pub task: Arc<dyn SchedulerTask>,
}

/// Tracks in-flight tasks across the scheduler's admitted concurrency
/// budget. Distinct from the admission control itself (a [`tokio::sync::Semaphore`]
/// held by [`super::scheduler::TaskScheduler`]) — this is purely
/// introspection, so callers can list or locate running work.
#[derive(Clone, Default)]
pub struct WorkerPool {
    active: Arc<Mutex<HashMap<String, ActiveTask>>>,
}

impl WorkerPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task as having started executing.
    pub fn mark_started(&self, task: ActiveTask) {
        self.active.lock().unwrap().insert(task.task_id.clone(), task);
    }

    /// Remove a task's bookkeeping entry once it finishes, fails, or is
    /// requeued after cancellation.
    pub fn mark_finished(&self, task_id: &str) {
        self.active.lock().unwrap().remove(task_id);
    }

    /// Number of tasks currently executing.
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    /// Snapshot of every currently executing task.
    pub fn list_active(&self) -> Vec<ActiveTask> {
        self.active.lock().unwrap().values().cloned().collect()
    }

    /// Find an active task's cancellation token by id, for the
    /// rescheduling protocol.
    pub fn cancellation_for(&self, task_id: &str) -> Option<CancellationToken> {
        self.active
            .lock()
            .unwrap()
            .get(task_id)
            .map(|t| t.cancel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scheduler::task::{StateSink, TaskOutcome};
    use async_trait::async_trait;

    struct StubTask;

    #[async_trait]
    impl SchedulerTask for StubTask {
        async fn execute(&self, _cancel: CancellationToken, _state: StateSink) -> TaskOutcome {
            TaskOutcome::Finished
        }
        fn task_kind(&self) -> &'static str {
            "stub"
        }
        fn task_id(&self) -> String {
            "stub".to_string()
        }
    }

    #[test]
    fn test_mark_started_and_finished() {
        let pool = WorkerPool::new();
        pool.mark_started(ActiveTask {
            task_id: "t1".to_string(),
            task_kind: "prepare",
            priority: TaskPriority::Normal,
            started_at: std::time::Instant::now(),
            cancel: CancellationToken::new(),
            task: Arc::new(StubTask),
        });
        assert_eq!(pool.active_count(), 1);
        pool.mark_finished("t1");
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_cancellation_for_missing_task() {
        let pool = WorkerPool::new();
        assert!(pool.cancellation_for("nope").is_none());
    }
}
