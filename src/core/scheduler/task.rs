//! Task definition and state callbacks for the scheduler.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A unit of schedulable work.
///
/// `execute` receives a [`CancellationToken`] it must check at natural
/// suspension points, and a [`StateSink`] to report lifecycle transitions.
/// Tasks that wrap a subprocess must translate cancellation into an
/// interrupt signal and await the child's exit rather than killing it
/// outright.
#[async_trait]
pub trait SchedulerTask: Send + Sync {
    /// Run the task to completion, observing `cancel` at suspension points.
    async fn execute(&self, cancel: CancellationToken, state: StateSink) -> TaskOutcome;

    /// Human-readable task kind, used in logs.
    fn task_kind(&self) -> &'static str;

    /// Stable identifier for this task instance, used in logs and in the
    /// index manager's task bookkeeping.
    fn task_id(&self) -> String;

    /// Whether `self` subsumes `other`'s work, i.e. completing `self` makes
    /// `other` redundant. Used by the scheduler's rescheduling protocol: a
    /// narrower, higher-priority request subsuming a broader running task
    /// causes the broader task to be cancelled and requeued.
    fn is_idempotent_with(&self, _other: &dyn SchedulerTask) -> bool {
        false
    }
}

/// Outcome of a task's `execute` call.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The task ran to completion.
    Finished,
    /// The task observed cancellation and should be requeued rather than
    /// treated as failed.
    CancelledToBeRescheduled,
    /// The task failed outright; carries a human-readable cause.
    Failed(String),
}

/// Priority levels for scheduled tasks. Ordered so that `Ord` compares
/// correctly: higher variants are selected first from the ready set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    /// Background indexing passes.
    Background = 0,
    /// Ordinary scheduled work.
    Normal = 1,
    /// A narrow, caller-blocking request (e.g. `wait_for_up_to_date_index(files)`).
    Interactive = 2,
}

/// Transition reported to a task's [`StateSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// The task has begun executing on a worker.
    Executing,
    /// The task was cancelled mid-flight to make room for a subsuming
    /// request, and has been requeued.
    CancelledToBeRescheduled,
    /// The task ran to completion.
    Finished,
}

/// Callback sink a task uses to report lifecycle transitions. Cloneable so
/// the scheduler can hand a copy to the spawned future while keeping one
/// for its own bookkeeping.
#[derive(Clone)]
pub struct StateSink {
    callback: Arc<dyn Fn(TaskState) + Send + Sync>,
}

impl StateSink {
    /// Wrap a callback closure.
    pub fn new(callback: impl Fn(TaskState) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// A sink that discards every transition.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Report a transition.
    pub fn notify(&self, state: TaskState) {
        (self.callback)(state);
    }
}

/// A cooperative cancellation flag shared between the scheduler and a
/// running task. Checking is advisory: tasks must poll it at suspension
/// points and when waiting on subprocesses must forward an interrupt.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark this token (and every clone of it) as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether this token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Interactive > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Background);
    }

    #[test]
    fn test_cancellation_token_shared_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_state_sink_invokes_callback() {
        use std::sync::atomic::AtomicUsize;
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let sink = StateSink::new(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        sink.notify(TaskState::Executing);
        sink.notify(TaskState::Finished);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
