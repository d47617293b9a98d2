//! Serial, priority-ordered task scheduling.
//!
//! Tasks are submitted to a [`Scheduler`], which runs them one at a time on a
//! dedicated worker thread, always choosing the highest-priority pending task.
//! Equal priorities run in submission order.

pub mod metrics;
pub mod queue;
pub mod runner;
pub mod status;
pub mod task;

pub use metrics::SchedulerMetrics;
pub use queue::OrderedQueue;
pub use runner::{Scheduler, SubmitError};
pub use status::{SchedulerStatus, TaskSummary};
pub use task::{StateChange, StateListener, Task, TaskBuilder, TaskError, TaskState, Work};

pub use taskline_core::{
    IdGenerator, Priority, SchedulerConfig, SequentialIdGenerator, TaskId, TasklineError,
    UuidGenerator,
};
