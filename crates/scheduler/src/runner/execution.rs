use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::task::{StateChange, StateListener, Task, TaskError, TaskState};

use super::core::Shared;
use super::scheduling::{ParkReason, Step};

/// Spawn the named worker thread for `shared`.
pub(super) fn spawn_worker(shared: Arc<Shared>) -> io::Result<JoinHandle<()>> {
    let mut builder = thread::Builder::new().name(shared.config.thread_name.clone());
    if let Some(size) = shared.config.stack_size {
        builder = builder.stack_size(size);
    }
    builder.spawn(move || run_worker(&shared))
}

/// Run the selection loop until the scheduler is torn down.
///
/// The lock is released while parked, while a task is being started, and
/// while queue-level completion listeners run.
fn run_worker(shared: &Arc<Shared>) {
    debug!("Scheduler {}: worker running", shared.identifier);

    let mut state = shared.lock_state();
    loop {
        match state.next_step() {
            Step::Stop => break,
            Step::Park(reason) => {
                if reason == ParkReason::Empty || state.is_drained() {
                    shared.idle.notify_all();
                }
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Step::Discard(task) => {
                shared.with_metrics(|m| m.tasks_discarded += 1);
                if shared.diagnostics() {
                    debug!(
                        "Scheduler {}: discarded {} task {}",
                        shared.identifier,
                        task.state(),
                        task.id()
                    );
                }
            }
            Step::Start(task) => {
                task.attach(wake_listener(shared));
                drop(state);
                launch(shared, &task);
                state = shared.lock_state();
            }
            Step::Retire(task) => {
                drop(state);
                retire(shared, &task);
                state = shared.lock_state();
                state.clear_executing(&task);
            }
        }
    }
    drop(state);

    info!("Scheduler {}: worker exited", shared.identifier);
}

/// Listener that wakes the worker when the executing task becomes terminal.
///
/// Holds the shared state weakly so a task outliving its scheduler does not
/// keep the queue alive.
fn wake_listener(shared: &Arc<Shared>) -> Arc<dyn StateListener> {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    Arc::new(move |change: &StateChange| {
        if !change.state.is_terminal() {
            return;
        }
        if let Some(shared) = weak.upgrade() {
            // Taking the lock orders this wake-up after the worker's check.
            let _state = shared.lock_state();
            shared.wake.notify_all();
        }
    })
}

/// Start a task on the worker thread. Work that hands itself off to another
/// thread returns here immediately and the worker parks until it reports.
fn launch(shared: &Shared, task: &Task) {
    if shared.diagnostics() {
        debug!(
            "Scheduler {}: starting task {} (priority: {})",
            shared.identifier,
            task.id(),
            task.priority()
        );
    }
    // Work panics are caught inside `start`; this catches listener panics.
    let started = match panic::catch_unwind(AssertUnwindSafe(|| task.start())) {
        Ok(started) => started,
        Err(_) => {
            error!(
                "Scheduler {}: listener of task {} panicked during start",
                shared.identifier,
                task.id()
            );
            task.cancel(Some(TaskError::Panicked("state listener panicked".into())));
            true
        }
    };
    if started {
        shared.with_metrics(|m| m.tasks_started += 1);
    } else if shared.diagnostics() {
        debug!(
            "Scheduler {}: task {} was {} before it could start",
            shared.identifier,
            task.id(),
            task.state()
        );
    }
}

/// Notify queue-level listeners and record metrics for a task that left the
/// executing slot.
fn retire(shared: &Shared, task: &Task) {
    let change = StateChange {
        task_id: task.id().clone(),
        state: task.state(),
        error: task.error(),
    };
    if shared.diagnostics() {
        debug!(
            "Scheduler {}: task {} left the slot as {}",
            shared.identifier, change.task_id, change.state
        );
    }

    let listeners = shared
        .completion_listeners
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    for listener in listeners {
        let delivered =
            panic::catch_unwind(AssertUnwindSafe(|| listener.on_state_change(&change)));
        if delivered.is_err() {
            error!(
                "Scheduler {}: completion listener panicked for task {}",
                shared.identifier, change.task_id
            );
        }
    }

    let failed = change.state == TaskState::Finished && change.error.is_some();
    shared.with_metrics(|m| m.record_completion(change.state, failed, task.run_duration()));
}
