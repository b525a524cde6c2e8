//! Process-wide task scheduler: bounded concurrency, priority ordering,
//! cooperative cancellation, and subsume-and-reschedule.

pub mod scheduler;
pub mod task;
pub mod worker;

pub use scheduler::{TaskHandle, TaskScheduler};
pub use task::{CancellationToken, SchedulerTask, StateSink, TaskOutcome, TaskPriority, TaskState};
pub use worker::{ActiveTask, WorkerPool};
