use taskline_core::TaskId;

use crate::task::{Task, TaskError, TaskState, Transition};

use super::core::{QueueState, SubmitError};

/// What the worker does next, decided under the queue lock.
pub(super) enum Step {
    /// The scheduler was torn down.
    Stop,
    Park(ParkReason),
    /// The executing task is terminal. It keeps the slot until retirement
    /// finishes, so waiters never observe a drained queue early.
    Retire(Task),
    /// A pending task was cancelled before promotion.
    Discard(Task),
    /// The task now occupies the executing slot and must be started.
    Start(Task),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ParkReason {
    Suspended,
    Executing,
    Empty,
}

impl QueueState {
    /// Decide the worker's next action, mutating the queue for that action.
    pub(super) fn next_step(&mut self) -> Step {
        if !self.alive {
            return Step::Stop;
        }
        if self.suspended {
            return Step::Park(ParkReason::Suspended);
        }
        if let Some(task) = &self.executing {
            if !task.is_terminal() {
                return Step::Park(ParkReason::Executing);
            }
            return Step::Retire(task.clone());
        }

        self.sort_pending();
        let Some(task) = self.pending.pop_front() else {
            return Step::Park(ParkReason::Empty);
        };
        if task.state() != TaskState::Ready {
            return Step::Discard(task);
        }
        self.executing = Some(task.clone());
        Step::Start(task)
    }

    /// Free the executing slot if it still holds `task`.
    pub(super) fn clear_executing(&mut self, task: &Task) {
        if self.executing.as_ref().is_some_and(|t| t.same_as(task)) {
            self.executing = None;
        }
    }

    /// Stable sort by descending priority, so ties keep submission order.
    pub(super) fn sort_pending(&mut self) {
        self.pending.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub(super) fn check_admission(&self, task: &Task) -> Result<(), SubmitError> {
        if !self.alive {
            return Err(SubmitError::ShutDown);
        }
        let state = task.state();
        if state != TaskState::Idle {
            return Err(SubmitError::NotIdle {
                id: task.id().clone(),
                state,
            });
        }
        if self.holds(task.id()) {
            return Err(SubmitError::Duplicate(task.id().clone()));
        }
        Ok(())
    }

    /// Is a task with this id pending or executing?
    pub(super) fn holds(&self, id: &TaskId) -> bool {
        self.executing.as_ref().is_some_and(|t| t.id() == id)
            || self.pending.contains_where(|t| t.id() == id)
    }

    pub(super) fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.executing.is_none()
    }

    /// Empty the pending queue, committing a cancellation for every task that
    /// was still live. The caller fires the transitions after unlocking.
    pub(super) fn withdraw_pending(&mut self, error: Option<TaskError>) -> Vec<Transition> {
        self.pending
            .drain_all()
            .into_iter()
            .filter_map(|task| task.cancel_deferred(error.clone()))
            .collect()
    }

    /// Request cooperative cancellation of the executing task. Only commits a
    /// transition if the task had not started yet.
    pub(super) fn interrupt_executing(&self) -> Option<Transition> {
        self.executing.as_ref()?.request_cancel_deferred()
    }
}
