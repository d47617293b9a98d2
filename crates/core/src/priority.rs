use std::fmt;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Task execution priority. Higher numeric value = runs first.
///
/// Values are always kept inside `[Priority::MIN, Priority::MAX]`; every
/// constructor and arithmetic operator clamps instead of overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub struct Priority(i32);

impl Priority {
    /// Lower bound of the priority range.
    pub const MIN: Priority = Priority(0);
    /// Upper bound of the priority range.
    pub const MAX: Priority = Priority(1000);

    /// Deferrable maintenance work.
    pub const BACKGROUND: Priority = Priority(0);
    /// Work the user is not waiting on.
    pub const LOW: Priority = Priority(250);
    /// Unclassified work.
    pub const DEFAULT: Priority = Priority(500);
    /// Work the user is waiting on.
    pub const HIGH: Priority = Priority(750);
    /// Work that must run before anything else.
    pub const USER_INTERACTIVE: Priority = Priority(1000);

    /// Build a priority from a raw value, clamped into range.
    pub const fn new(value: i32) -> Self {
        if value < Self::MIN.0 {
            Self::MIN
        } else if value > Self::MAX.0 {
            Self::MAX
        } else {
            Priority(value)
        }
    }

    pub const fn value(self) -> i32 {
        self.0
    }

    /// `self + delta`, clamped.
    pub const fn raised(self, delta: i32) -> Self {
        Self::new(self.0.saturating_add(delta))
    }

    /// `self - delta`, clamped.
    pub const fn lowered(self, delta: i32) -> Self {
        Self::new(self.0.saturating_sub(delta))
    }

    /// Name of the preset this value matches, if any.
    pub fn preset_name(self) -> Option<&'static str> {
        match self {
            Self::BACKGROUND => Some("background"),
            Self::LOW => Some("low"),
            Self::DEFAULT => Some("default"),
            Self::HIGH => Some("high"),
            Self::USER_INTERACTIVE => Some("user_interactive"),
            _ => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<Priority> for i32 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl Add<i32> for Priority {
    type Output = Priority;

    fn add(self, rhs: i32) -> Priority {
        self.raised(rhs)
    }
}

impl Sub<i32> for Priority {
    type Output = Priority;

    fn sub(self, rhs: i32) -> Priority {
        self.lowered(rhs)
    }
}

impl Mul<i32> for Priority {
    type Output = Priority;

    fn mul(self, rhs: i32) -> Priority {
        Self::new(self.0.saturating_mul(rhs))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.preset_name() {
            Some(name) => write!(f, "{name}({})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}
