use std::collections::vec_deque;
use std::collections::VecDeque;

/// Bounded FIFO of past wave functions
///
/// Storage is allocated once. Pushing into a full buffer drops the oldest
/// entry. Entries are addressed by age: `newest(0)` is the last one pushed.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> History<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        History {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item` and returns the entry evicted to make room, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(item);
        evicted
    }

    pub fn newest(&self, age: usize) -> Option<&T> {
        self.entries
            .len()
            .checked_sub(age + 1)
            .and_then(|idx| self.entries.get(idx))
    }

    /// Oldest to newest.
    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
