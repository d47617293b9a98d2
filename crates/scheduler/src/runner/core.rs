use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use taskline_core::{IdGenerator, SchedulerConfig, TaskId, TasklineError, UuidGenerator};
use tracing::{debug, error, info, warn};

use crate::metrics::SchedulerMetrics;
use crate::queue::OrderedQueue;
use crate::status::{SchedulerStatus, TaskSummary};
use crate::task::{StateListener, Task, TaskError, TaskState, Transition};

/// Why a submission was refused. The pending queue is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("task {id} is {state}, only idle tasks can be submitted")]
    NotIdle { id: TaskId, state: TaskState },

    #[error("a task with id {0} is already pending or executing")]
    Duplicate(TaskId),

    #[error("scheduler has shut down")]
    ShutDown,
}

/// Queue state guarded by the scheduler lock.
pub(super) struct QueueState {
    pub(super) pending: OrderedQueue<Task>,
    pub(super) executing: Option<Task>,
    pub(super) suspended: bool,
    pub(super) alive: bool,
}

/// State shared between the [`Scheduler`] handle and its worker thread.
pub(super) struct Shared {
    pub(super) identifier: String,
    pub(super) config: SchedulerConfig,
    pub(super) state: Mutex<QueueState>,
    /// Parks the worker.
    pub(super) wake: Condvar,
    /// Wakes callers of `wait_until_idle`.
    pub(super) idle: Condvar,
    pub(super) metrics: RwLock<SchedulerMetrics>,
    pub(super) completion_listeners: RwLock<Vec<Arc<dyn StateListener>>>,
}

impl Shared {
    pub(super) fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn with_metrics(&self, f: impl FnOnce(&mut SchedulerMetrics)) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut metrics);
    }

    pub(super) fn diagnostics(&self) -> bool {
        self.config.diagnostics
    }
}

/// A priority-ordered scheduler that runs one task at a time on a dedicated
/// worker thread.
///
/// Every operation may be called concurrently from any thread. Dropping the
/// scheduler shuts it down.
pub struct Scheduler {
    pub(super) shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Validate the config and spawn the worker thread.
    pub fn new(config: SchedulerConfig) -> Result<Self, TasklineError> {
        config.validate()?;
        let identifier = config
            .identifier
            .clone()
            .unwrap_or_else(|| UuidGenerator.next_id().to_string());

        let shared = Arc::new(Shared {
            identifier,
            config,
            state: Mutex::new(QueueState {
                pending: OrderedQueue::new(),
                executing: None,
                suspended: false,
                alive: true,
            }),
            wake: Condvar::new(),
            idle: Condvar::new(),
            metrics: RwLock::new(SchedulerMetrics::default()),
            completion_listeners: RwLock::new(Vec::new()),
        });

        let worker = super::execution::spawn_worker(Arc::clone(&shared))?;
        info!(
            "Scheduler {} started (worker thread: {})",
            shared.identifier, shared.config.thread_name
        );
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.shared.identifier
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Admit an idle task into the pending queue.
    ///
    /// The task becomes `Ready` and its listeners are notified before this
    /// returns. The worker is woken when nothing is executing and the
    /// scheduler is not suspended.
    pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
        let admitted = {
            let mut state = self.shared.lock_state();
            state.check_admission(&task).and_then(|()| {
                let transition = task.admit().ok_or_else(|| SubmitError::NotIdle {
                    id: task.id().clone(),
                    state: task.state(),
                })?;
                state.pending.push_back(task.clone());
                state.sort_pending();
                if !state.suspended && state.executing.is_none() {
                    self.shared.wake.notify_all();
                }
                Ok(transition)
            })
        };

        match admitted {
            Ok(transition) => {
                transition.fire();
                self.shared.with_metrics(|m| m.tasks_submitted += 1);
                if self.shared.diagnostics() {
                    debug!(
                        "Scheduler {}: admitted task {} (priority: {})",
                        self.shared.identifier,
                        task.id(),
                        task.priority()
                    );
                }
                Ok(())
            }
            Err(err) => {
                self.shared.with_metrics(|m| m.tasks_rejected += 1);
                match &err {
                    SubmitError::ShutDown => {
                        warn!("Scheduler {}: submit after shutdown", self.shared.identifier)
                    }
                    _ => debug!("Scheduler {}: rejected submission: {}", self.shared.identifier, err),
                }
                Err(err)
            }
        }
    }

    /// Submit each task in order. Returns how many were accepted.
    pub fn submit_all<I>(&self, tasks: I) -> usize
    where
        I: IntoIterator<Item = Task>,
    {
        tasks
            .into_iter()
            .filter(|task| self.submit(task.clone()).is_ok())
            .count()
    }

    /// Cancel and remove every pending task, and request cooperative
    /// cancellation of the executing one.
    pub fn cancel_all(&self) {
        let (withdrawn, interrupted) = {
            let mut state = self.shared.lock_state();
            let withdrawn = state.withdraw_pending(None);
            let interrupted = state.interrupt_executing();
            self.shared.idle.notify_all();
            (withdrawn, interrupted)
        };
        self.deliver(withdrawn, interrupted);
    }

    /// Cancel one task by identifier.
    ///
    /// A pending task is removed and cancelled; the executing task only has
    /// cancellation requested. Returns `false` if no such task is held.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let mut state = self.shared.lock_state();
        let removed = state.pending.remove_where(|t| t.id() == id);
        if let Some(task) = removed {
            self.shared.idle.notify_all();
            drop(state);
            self.deliver(task.cancel_deferred(None).into_iter().collect(), None);
            true
        } else if state.executing.as_ref().is_some_and(|t| t.id() == id) {
            let interrupted = state.interrupt_executing();
            drop(state);
            self.deliver(Vec::new(), interrupted);
            true
        } else {
            false
        }
    }

    /// Stop promoting pending tasks. The executing task is unaffected.
    pub fn suspend(&self) {
        let mut state = self.shared.lock_state();
        if !state.suspended && self.shared.diagnostics() {
            debug!("Scheduler {}: suspended", self.shared.identifier);
        }
        state.suspended = true;
        self.shared.wake.notify_all();
    }

    /// Resume promotion and wake the worker. No-op unless suspended.
    pub fn resume(&self) {
        let mut state = self.shared.lock_state();
        if !state.suspended {
            return;
        }
        state.suspended = false;
        self.shared.wake.notify_all();
        if self.shared.diagnostics() {
            debug!("Scheduler {}: resumed", self.shared.identifier);
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.lock_state().suspended
    }

    /// Has teardown begun?
    pub fn is_shut_down(&self) -> bool {
        !self.shared.lock_state().alive
    }

    /// Snapshot of the executing task followed by the pending tasks in queue
    /// order.
    pub fn all_tasks(&self) -> Vec<Task> {
        let state = self.shared.lock_state();
        state
            .executing
            .iter()
            .chain(state.pending.iter())
            .cloned()
            .collect()
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.shared.lock_state();
        SchedulerStatus {
            identifier: self.shared.identifier.clone(),
            is_suspended: state.suspended,
            is_alive: state.alive,
            executing: state.executing.as_ref().map(TaskSummary::from),
            pending: state.pending.iter().map(TaskSummary::from).collect(),
        }
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.shared
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a listener called on the worker thread each time a task
    /// leaves the executing slot.
    pub fn on_task_complete<L>(&self, listener: L)
    where
        L: StateListener + 'static,
    {
        self.shared
            .completion_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Block until nothing is pending or executing, or the timeout elapses.
    /// Returns whether the scheduler drained.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let state = self.shared.lock_state();
        let (state, _) = self
            .shared
            .idle
            .wait_timeout_while(state, timeout, |s| s.alive && !s.is_drained())
            .unwrap_or_else(PoisonError::into_inner);
        state.is_drained()
    }

    /// Cancel pending tasks with [`TaskError::Shutdown`], stop the worker and
    /// join it. Idempotent; later operations are no-ops.
    pub fn shutdown(&self) {
        let (withdrawn, interrupted) = {
            let mut state = self.shared.lock_state();
            if !state.alive {
                (Vec::new(), None)
            } else {
                state.alive = false;
                let withdrawn = state.withdraw_pending(Some(TaskError::Shutdown));
                let interrupted = state.interrupt_executing();
                self.shared.wake.notify_all();
                self.shared.idle.notify_all();
                (withdrawn, interrupted)
            }
        };
        self.deliver(withdrawn, interrupted);

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        // A task dropping the last handle from inside its own work runs here
        // on the worker thread, which exits once that work returns.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!("Scheduler {}: worker thread panicked", self.shared.identifier);
        }
        info!("Scheduler {} stopped", self.shared.identifier);
    }

    /// Fire transitions committed under the lock and account for withdrawn
    /// pending tasks.
    fn deliver(&self, withdrawn: Vec<Transition>, interrupted: Option<Transition>) {
        if self.shared.diagnostics() {
            for transition in &withdrawn {
                debug!(
                    "Scheduler {}: withdrew task {}",
                    self.shared.identifier,
                    transition.change().task_id
                );
            }
        }
        let count = withdrawn.len() as u64;
        for transition in withdrawn.into_iter().chain(interrupted) {
            transition.fire();
        }
        if count > 0 {
            self.shared.with_metrics(|m| m.tasks_withdrawn += count);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.status().fmt(f)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("identifier", &self.shared.identifier)
            .finish_non_exhaustive()
    }
}
