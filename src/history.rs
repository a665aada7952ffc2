//! Bounded rolling history for display.
//!
//! The history only feeds charts and tables; no alerting decision reads it.

use std::collections::VecDeque;

use serde::Serialize;

/// Number of samples kept for display.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// A fixed-capacity FIFO that evicts the oldest entry when full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, returning the evicted entry if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Newest first, the order the history table shows.
    pub fn newest_first(&self) -> Vec<T> {
        self.items.iter().rev().cloned().collect()
    }
}

impl<T: Serialize> Serialize for RingBuffer<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut buffer = RingBuffer::new(3);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), None);
        assert_eq!(buffer.push(4), Some(1));

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(buffer.newest_first(), vec![4, 3, 2]);
        assert_eq!(buffer.latest(), Some(&4));
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut buffer = RingBuffer::new(0);
        buffer.push("a");
        buffer.push("b");
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.latest(), Some(&"b"));
    }

    #[test]
    fn test_default_capacity_window() {
        let mut buffer = RingBuffer::new(DEFAULT_HISTORY_CAPACITY);
        for i in 0..25 {
            buffer.push(i);
        }
        assert_eq!(buffer.len(), 20);
        assert_eq!(buffer.iter().next(), Some(&5));
    }

    #[test]
    fn test_serializes_as_sequence() {
        let mut buffer = RingBuffer::new(2);
        buffer.push(7);
        buffer.push(8);
        assert_eq!(serde_json::to_string(&buffer).unwrap(), "[7,8]");
    }
}
