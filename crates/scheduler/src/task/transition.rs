use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::thread::ThreadId;

use super::listener::StateListener;
use super::state::StateChange;
use super::{Task, Work};

/// A committed state change whose listener notifications have not run yet.
///
/// The scheduler commits transitions while holding its queue lock and fires
/// them after releasing it, so listener code never runs under that lock.
/// Transitions of one task are delivered in commit order even when fired from
/// different threads: a later transition is not delivered until every
/// listener of the earlier ones has returned. Dropping an unfired transition
/// skips its listeners but still releases its place in that order.
///
/// A terminal transition also carries the work closure the task never ran, so
/// user destructors run wherever the transition is delivered.
#[must_use = "listeners are only notified when the transition is fired"]
pub(crate) struct Transition {
    task: Task,
    seq: u64,
    change: StateChange,
    listeners: Vec<Arc<dyn StateListener>>,
    unused_work: Option<Work>,
    pending: bool,
}

impl Transition {
    pub(super) fn new(
        task: Task,
        seq: u64,
        change: StateChange,
        listeners: Vec<Arc<dyn StateListener>>,
        unused_work: Option<Work>,
    ) -> Self {
        Self {
            task,
            seq,
            change,
            listeners,
            unused_work,
            pending: true,
        }
    }

    pub(crate) fn change(&self) -> &StateChange {
        &self.change
    }

    /// Notify every listener captured at commit time, in registration order.
    ///
    /// Blocks until every earlier transition of the task has been delivered.
    /// Fired from inside one of this task's own listeners, the notification
    /// is queued and delivered as soon as the running listener returns.
    pub(crate) fn fire(mut self) {
        let listeners = mem::take(&mut self.listeners);
        self.enqueue(listeners);
    }

    fn enqueue(&mut self, listeners: Vec<Arc<dyn StateListener>>) {
        self.pending = false;
        let delivery = Delivery {
            change: self.change.clone(),
            listeners,
            unused_work: self.unused_work.take(),
        };
        self.task.deliver_in_order(self.seq, delivery);
    }
}

impl Drop for Transition {
    fn drop(&mut self) {
        if self.pending {
            self.enqueue(Vec::new());
        }
    }
}

/// One transition's notifications, waiting for its turn.
pub(super) struct Delivery {
    pub(super) change: StateChange,
    listeners: Vec<Arc<dyn StateListener>>,
    unused_work: Option<Work>,
}

impl Delivery {
    pub(super) fn notify(self) {
        for listener in &self.listeners {
            listener.on_state_change(&self.change);
        }
        drop(self.unused_work);
    }
}

/// Per-task ordering of deliveries.
///
/// At most one thread delivers at a time. It drains consecutive sequence
/// numbers and stops at the first gap, which the committing thread fills
/// when it fires.
#[derive(Default)]
pub(super) struct DeliveryQueue {
    /// Highest sequence number whose listeners have all returned.
    pub(super) delivered: u64,
    /// Thread currently running listeners of this task.
    pub(super) deliverer: Option<ThreadId>,
    pub(super) queued: BTreeMap<u64, Delivery>,
}

impl DeliveryQueue {
    /// Can a thread take over delivery right now?
    pub(super) fn next_is_queued(&self) -> bool {
        self.deliverer.is_none() && self.queued.contains_key(&(self.delivered + 1))
    }

    pub(super) fn take_next(&mut self) -> Option<Delivery> {
        let next = self.delivered + 1;
        self.queued.remove(&next)
    }
}
