//! Task: one unit of schedulable work and its lifecycle state machine.
//!
//! A [`Task`] is a cheap handle (`Clone` shares the same task). The scheduler,
//! the caller and the work closure all hold clones. Whoever performs a
//! transition delivers the listener notifications, in commit order.

mod listener;
mod state;
mod transition;

pub use listener::StateListener;
pub use state::{StateChange, TaskError, TaskState};
pub(crate) use transition::Transition;

use transition::{Delivery, DeliveryQueue};

use std::any::Any;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use taskline_core::{IdGenerator, Priority, TaskId, UuidGenerator};
use tracing::error;

/// User work invoked once when the task starts. Receives the task itself so it
/// can later call [`Task::finish`] or [`Task::cancel`], from any thread.
pub type Work = Box<dyn FnOnce(Task) + Send + 'static>;

/// Handle to a unit of work with a priority, an identity and a lifecycle.
#[derive(Clone)]
pub struct Task {
    inner: Arc<Inner>,
}

struct Inner {
    id: TaskId,
    priority: Priority,
    created_at: DateTime<Utc>,
    cancel_requested: AtomicBool,
    core: Mutex<Core>,
    /// Signalled once a terminal transition has been delivered.
    settled: Condvar,
    delivery: Mutex<DeliveryQueue>,
    /// Signalled whenever a delivery completes or the deliverer role is freed.
    turn: Condvar,
}

struct Core {
    state: TaskState,
    error: Option<TaskError>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    listeners: Vec<Arc<dyn StateListener>>,
    work: Option<Work>,
    /// Sequence number of the last committed transition.
    committed: u64,
    settled: bool,
}

impl Task {
    /// Create an idle task with a generated identifier.
    pub fn new<F>(priority: Priority, work: F) -> Self
    where
        F: FnOnce(Task) + Send + 'static,
    {
        Self::builder(work).priority(priority).build()
    }

    pub fn builder<F>(work: F) -> TaskBuilder
    where
        F: FnOnce(Task) + Send + 'static,
    {
        TaskBuilder::new(Box::new(work))
    }

    fn from_parts(
        id: TaskId,
        priority: Priority,
        work: Work,
        listeners: Vec<Arc<dyn StateListener>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                priority,
                created_at: Utc::now(),
                cancel_requested: AtomicBool::new(false),
                core: Mutex::new(Core {
                    state: TaskState::Idle,
                    error: None,
                    started_at: None,
                    finished_at: None,
                    listeners,
                    work: Some(work),
                    committed: 0,
                    settled: false,
                }),
                settled: Condvar::new(),
                delivery: Mutex::new(DeliveryQueue::default()),
                turn: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.inner.id
    }

    pub fn priority(&self) -> Priority {
        self.inner.priority
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lock_core().started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.lock_core().finished_at
    }

    /// Wall time between `Running` and the terminal transition.
    pub fn run_duration(&self) -> Option<Duration> {
        let core = self.lock_core();
        let elapsed = core.finished_at? - core.started_at?;
        elapsed.to_std().ok()
    }

    pub fn state(&self) -> TaskState {
        self.lock_core().state
    }

    /// Error recorded by the terminal transition, if any.
    pub fn error(&self) -> Option<TaskError> {
        self.lock_core().error.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.state() == TaskState::Idle
    }

    pub fn is_ready(&self) -> bool {
        self.state() == TaskState::Ready
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == TaskState::Canceled
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Has cooperative cancellation been requested? Running work should poll this.
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::Acquire)
    }

    /// Register a state observer. Returns `false` (and drops the listener) if
    /// the task is already terminal.
    pub fn add_listener<L>(&self, listener: L) -> bool
    where
        L: StateListener + 'static,
    {
        self.attach(Arc::new(listener))
    }

    pub(crate) fn attach(&self, listener: Arc<dyn StateListener>) -> bool {
        let mut core = self.lock_core();
        if core.state.is_terminal() {
            return false;
        }
        core.listeners.push(listener);
        true
    }

    /// `Running -> Finished`. No-op (returns `false`) in any other state.
    pub fn finish(&self, error: Option<TaskError>) -> bool {
        deliver(self.commit_if(|_| true, TaskState::Finished, error))
    }

    pub fn finish_ok(&self) -> bool {
        self.finish(None)
    }

    /// Finish with a failure attached for listeners to inspect.
    pub fn fail(&self, error: TaskError) -> bool {
        self.finish(Some(error))
    }

    /// Any non-terminal state -> `Canceled`. A task cancelled before it
    /// starts never runs its work.
    pub fn cancel(&self, error: Option<TaskError>) -> bool {
        deliver(self.cancel_deferred(error))
    }

    /// Cooperative cancellation: cancels a task that has not started yet, and
    /// only raises [`Task::is_cancel_requested`] on a running one. Returns
    /// whether the task transitioned.
    pub fn request_cancel(&self) -> bool {
        deliver(self.request_cancel_deferred())
    }

    /// Block until the task is terminal and its listeners have been notified,
    /// or the timeout elapses. Returns whether the task settled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let core = self.lock_core();
        let (core, _) = self
            .inner
            .settled
            .wait_timeout_while(core, timeout, |c| !c.settled)
            .unwrap_or_else(PoisonError::into_inner);
        core.settled
    }

    /// `Idle -> Ready`, notified by the caller once the queue lock is released.
    pub(crate) fn admit(&self) -> Option<Transition> {
        self.commit_if(|_| true, TaskState::Ready, None)
    }

    pub(crate) fn cancel_deferred(&self, error: Option<TaskError>) -> Option<Transition> {
        self.commit_if(|_| true, TaskState::Canceled, error)
    }

    pub(crate) fn request_cancel_deferred(&self) -> Option<Transition> {
        self.inner.cancel_requested.store(true, Ordering::Release);
        self.commit_if(
            |state| matches!(state, TaskState::Idle | TaskState::Ready),
            TaskState::Canceled,
            None,
        )
    }

    /// `Ready -> Running`, then run the work closure on the calling thread.
    ///
    /// A panic inside the work cancels the task with [`TaskError::Panicked`]
    /// instead of unwinding into the caller.
    pub(crate) fn start(&self) -> bool {
        let (transition, work) = {
            let mut core = self.lock_core();
            if core.state != TaskState::Ready {
                return false;
            }
            let work = core.work.take();
            (self.apply(&mut core, TaskState::Running, None), work)
        };
        transition.fire();

        if let Some(work) = work {
            let task = self.clone();
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || work(task))) {
                let message = panic_message(payload.as_ref());
                error!(task = %self.id(), %message, "task work panicked");
                self.cancel(Some(TaskError::Panicked(message)));
            }
        }
        true
    }

    fn commit_if(
        &self,
        allowed: impl FnOnce(TaskState) -> bool,
        next: TaskState,
        error: Option<TaskError>,
    ) -> Option<Transition> {
        let mut core = self.lock_core();
        if !core.state.can_transition_to(next) || !allowed(core.state) {
            return None;
        }
        Some(self.apply(&mut core, next, error))
    }

    fn apply(&self, core: &mut Core, next: TaskState, error: Option<TaskError>) -> Transition {
        let now = Utc::now();
        core.state = next;
        match next {
            TaskState::Running => core.started_at = Some(now),
            s if s.is_terminal() => {
                core.finished_at = Some(now);
                core.error = error.clone();
            }
            _ => {}
        }
        let (listeners, unused_work) = if next.is_terminal() {
            (mem::take(&mut core.listeners), core.work.take())
        } else {
            (core.listeners.clone(), None)
        };
        core.committed += 1;
        let change = StateChange {
            task_id: self.inner.id.clone(),
            state: next,
            error,
        };
        Transition::new(self.clone(), core.committed, change, listeners, unused_work)
    }

    /// Deliver `delivery` (sequence `seq`) after every earlier transition.
    ///
    /// Returns once `seq` has been delivered, except when called from inside
    /// one of this task's listeners: then the delivery is queued for the
    /// thread already delivering, which runs it after the current listener.
    fn deliver_in_order(&self, seq: u64, delivery: Delivery) {
        let me = thread::current().id();
        let mut queue = self.lock_delivery();
        queue.queued.insert(seq, delivery);
        if queue.deliverer == Some(me) {
            return;
        }
        while queue.delivered < seq {
            if queue.next_is_queued() {
                queue.deliverer = Some(me);
                let (guard, panicked) = self.drain(queue);
                queue = guard;
                queue.deliverer = None;
                self.inner.turn.notify_all();
                if let Some(payload) = panicked {
                    drop(queue);
                    panic::resume_unwind(payload);
                }
            } else {
                queue = self
                    .inner
                    .turn
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    /// Run queued deliveries in sequence until the next one is missing.
    /// Listener panics are held back until the queue is consistent again.
    fn drain<'a>(
        &'a self,
        mut queue: MutexGuard<'a, DeliveryQueue>,
    ) -> (MutexGuard<'a, DeliveryQueue>, Option<Box<dyn Any + Send>>) {
        let mut panicked = None;
        loop {
            let next = queue.take_next();
            let Some(delivery) = next else {
                break;
            };
            drop(queue);
            let terminal = delivery.change.state.is_terminal();
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || delivery.notify())) {
                panicked.get_or_insert(payload);
            }
            if terminal {
                self.mark_settled();
            }
            queue = self.lock_delivery();
            queue.delivered += 1;
            self.inner.turn.notify_all();
        }
        (queue, panicked)
    }

    fn lock_delivery(&self) -> MutexGuard<'_, DeliveryQueue> {
        self.inner
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_settled(&self) {
        let mut core = self.lock_core();
        core.settled = true;
        self.inner.settled.notify_all();
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn same_as(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn deliver(transition: Option<Transition>) -> bool {
    match transition {
        Some(t) => {
            t.fire();
            true
        }
        None => false,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", self.id())
            .field("priority", &self.priority())
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task({}, priority: {}, state: {})",
            self.id(),
            self.priority(),
            self.state()
        )
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Configures a [`Task`] before construction.
pub struct TaskBuilder {
    work: Work,
    priority: Priority,
    id: Option<TaskId>,
    listeners: Vec<Arc<dyn StateListener>>,
}

impl TaskBuilder {
    fn new(work: Work) -> Self {
        Self {
            work,
            priority: Priority::DEFAULT,
            id: None,
            listeners: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Use a caller-chosen identifier (enables duplicate suppression across
    /// resubmissions of equivalent work).
    pub fn id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: StateListener + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Run `f` once when the task reaches a terminal state.
    pub fn on_completion<F>(self, f: F) -> Self
    where
        F: FnOnce(&StateChange) + Send + 'static,
    {
        let slot = Mutex::new(Some(f));
        self.listener(move |change: &StateChange| {
            if !change.state.is_terminal() {
                return;
            }
            let f = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(f) = f {
                f(change);
            }
        })
    }

    /// Build with a random UUID identifier unless one was set.
    pub fn build(self) -> Task {
        self.build_with(&UuidGenerator)
    }

    /// Build, drawing the identifier from `ids` unless one was set.
    pub fn build_with(self, ids: &dyn IdGenerator) -> Task {
        let id = self.id.unwrap_or_else(|| ids.next_id());
        Task::from_parts(id, self.priority, self.work, self.listeners)
    }
}
