//! Serializable introspection snapshots of a scheduler and its tasks.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use taskline_core::{Priority, TaskId};

use crate::task::{Task, TaskState};

/// Point-in-time description of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub priority: Priority,
    pub state: TaskState,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id().clone(),
            priority: task.priority(),
            state: task.state(),
            error: task.error().map(|e| e.to_string()),
            created_at: task.created_at(),
            started_at: task.started_at(),
            cancel_requested: task.is_cancel_requested(),
        }
    }
}

impl fmt::Display for TaskSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task({}, priority: {}, state: {})",
            self.id, self.priority, self.state
        )?;
        if let Some(err) = &self.error {
            write!(f, " [{err}]")?;
        }
        Ok(())
    }
}

/// Human-readable and JSON-serializable dump of a scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub identifier: String,
    pub is_suspended: bool,
    pub is_alive: bool,
    pub executing: Option<TaskSummary>,
    pub pending: Vec<TaskSummary>,
}

impl SchedulerStatus {
    /// Executing task first, then pending tasks in queue order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskSummary> {
        self.executing.iter().chain(self.pending.iter())
    }
}

impl fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scheduler<{}> : {{", self.identifier)?;
        writeln!(f, "\tisSuspended: {},", self.is_suspended)?;
        writeln!(f, "\ttasks: [")?;
        for task in self.tasks() {
            writeln!(f, "\t\t{task}")?;
        }
        writeln!(f, "\t]")?;
        write!(f, "}}")
    }
}
