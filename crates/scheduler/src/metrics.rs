use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::task::TaskState;

/// Scheduler operational counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Tasks accepted by `submit`.
    pub tasks_submitted: u64,
    /// Submissions rejected (not idle, duplicate id, or after shutdown).
    pub tasks_rejected: u64,
    /// Tasks promoted into the executing slot and started.
    pub tasks_started: u64,
    /// Tasks that left the executing slot as `Finished`.
    pub tasks_finished: u64,
    /// Finished tasks that carried an error.
    pub tasks_failed: u64,
    /// Tasks that left the executing slot as `Canceled`.
    pub tasks_canceled: u64,
    /// Pending tasks found already cancelled when the worker popped them.
    pub tasks_discarded: u64,
    /// Pending tasks withdrawn by `cancel`, `cancel_all` or shutdown.
    pub tasks_withdrawn: u64,
    /// Average wall time between `Running` and the terminal state.
    pub avg_run_duration: Duration,
    /// Longest observed run.
    pub max_run_duration: Duration,
    /// When the executing slot was last freed.
    pub last_completed_at: Option<DateTime<Utc>>,
    /// Completions that contributed a duration to the average.
    #[serde(skip)]
    timed_runs: u64,
}

impl SchedulerMetrics {
    /// Record a task leaving the executing slot.
    pub fn record_completion(&mut self, state: TaskState, failed: bool, run: Option<Duration>) {
        match state {
            TaskState::Finished => {
                self.tasks_finished += 1;
                if failed {
                    self.tasks_failed += 1;
                }
            }
            TaskState::Canceled => self.tasks_canceled += 1,
            _ => {}
        }
        self.last_completed_at = Some(Utc::now());

        let Some(duration) = run else {
            return;
        };
        self.max_run_duration = self.max_run_duration.max(duration);
        self.timed_runs += 1;

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.timed_runs;
        self.avg_run_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_run_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    /// Tasks that have left the scheduler in any terminal way.
    pub fn tasks_completed(&self) -> u64 {
        self.tasks_finished + self.tasks_canceled + self.tasks_discarded + self.tasks_withdrawn
    }
}
