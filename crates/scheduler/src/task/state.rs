use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskline_core::TaskId;

/// Lifecycle state of a task.
///
/// State transitions:
/// - Idle -> Ready (admitted into a scheduler)
/// - Ready -> Running (picked by the worker)
/// - Running -> Finished | Canceled (reported by the task's own work)
/// - Idle | Ready -> Canceled (cancelled before it started)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created, not yet submitted.
    Idle,
    /// Waiting in a pending queue.
    Ready,
    /// Work closure has been invoked and has not reported completion.
    Running,
    /// Work reported completion, possibly with an error.
    Finished,
    /// Cancelled before or during execution.
    Canceled,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Canceled)
    }

    /// May a task in this state move to `next`?
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Idle, Ready)
                | (Ready, Running)
                | (Running, Finished)
                | (Idle | Ready | Running, Canceled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error value a task may attach when it finishes or is cancelled.
///
/// The scheduler never interprets these; they are passed through to listeners.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),
    #[error("task canceled: {0}")]
    Canceled(String),
    #[error("task timed out after {0:?}")]
    TimedOut(Duration),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("scheduler shut down")]
    Shutdown,
}

impl TaskError {
    /// Wrap any displayable error as a failure.
    pub fn failed(err: impl fmt::Display) -> Self {
        TaskError::Failed(err.to_string())
    }
}

/// One observed state transition, delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub task_id: TaskId,
    pub state: TaskState,
    pub error: Option<TaskError>,
}
