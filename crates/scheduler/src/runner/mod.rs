//! Serial scheduler runner -- owns the pending queue and the worker thread.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, caller-facing operations and teardown
//! - `scheduling`: admission checks and the worker's per-iteration decision
//! - `execution`: the worker loop, task launch and slot retirement

mod core;
mod execution;
mod scheduling;

pub use self::core::{Scheduler, SubmitError};
