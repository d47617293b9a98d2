use super::state::StateChange;

/// Observer of task state transitions.
///
/// Called synchronously, normally on the thread that performed the transition.
/// Later transitions of the same task wait until this call returns, so
/// implementations must not block for long: the worker may be one of them.
/// A transition triggered from inside this call is delivered right after it.
pub trait StateListener: Send + Sync {
    fn on_state_change(&self, change: &StateChange);
}

impl<F> StateListener for F
where
    F: Fn(&StateChange) + Send + Sync,
{
    fn on_state_change(&self, change: &StateChange) {
        self(change)
    }
}
