//! Bounded FIFO windows
//!
//! Every rolling buffer in the engine (typing intervals, error log, focus
//! history, tab pattern slots) is a `RollingWindow`: inserting into a full
//! window evicts the oldest entry, and iteration is oldest first.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bounded, chronologically ordered sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    /// Create an empty window holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, returning the evicted oldest value if the window was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    pub fn last(&self) -> Option<&T> {
        self.values.back()
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.values.iter()
    }

    /// The newest `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.values.len().saturating_sub(n);
        self.values.iter().skip(skip)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl<T: Clone> RollingWindow<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.values.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        assert_eq!(window.push(1), None);
        assert_eq!(window.push(2), None);
        assert_eq!(window.push(3), None);
        assert!(window.is_full());

        assert_eq!(window.push(4), Some(1));
        assert_eq!(window.to_vec(), vec![2, 3, 4]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_tail_keeps_order() {
        let mut window = RollingWindow::new(10);
        for i in 0..6 {
            window.push(i);
        }
        let tail: Vec<_> = window.tail(3).copied().collect();
        assert_eq!(tail, vec![3, 4, 5]);

        // Asking for more than stored returns everything
        assert_eq!(window.tail(50).count(), 6);
    }

    #[test]
    fn test_clear() {
        let mut window = RollingWindow::new(2);
        window.push("a");
        window.push("b");
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.last(), None);
    }
}
