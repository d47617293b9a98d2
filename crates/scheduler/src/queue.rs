//! Ordered backing storage for the pending queue.

use std::cmp::Ordering;
use std::collections::VecDeque;

/// A mutable sequence with FIFO access, removal by predicate and a stable sort.
///
/// Elements appended after a sort land behind every element they compare
/// equal to once the queue is sorted again, which is how insertion order
/// breaks priority ties.
#[derive(Debug, Clone)]
pub struct OrderedQueue<T> {
    items: VecDeque<T>,
}

impl<T> OrderedQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push_back(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn peek_front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Remove and return the first element matching `pred`.
    pub fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let index = self.items.iter().position(pred)?;
        self.items.remove(index)
    }

    pub fn contains_where(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.items.iter().any(pred)
    }

    /// Stable in-place sort.
    pub fn sort_by(&mut self, compare: impl FnMut(&T, &T) -> Ordering) {
        self.items.make_contiguous().sort_by(compare);
    }

    /// Take every element, front to back, leaving the queue empty.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> Default for OrderedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for OrderedQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
