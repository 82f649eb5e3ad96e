// Stable min-heap keyed on (time, insertion sequence). Equal-time entries come
// back out in the order they went in, which is what keeps traces reproducible.

use std::cmp::Ordering;
use thiserror::Error;

pub type SimTime = u64;

const INITIAL_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("pop or peek called on an empty scheduler")]
    EmptyQueue,
}

#[derive(Debug, Clone)]
pub struct ScheduledEntry<T> {
    pub payload: T,
    pub time: SimTime,
    pub sequence: u64,
}

impl<T> ScheduledEntry<T> {
    #[inline]
    fn key(&self) -> (SimTime, u64) {
        (self.time, self.sequence)
    }

    #[inline]
    fn precedes(&self, other: &Self) -> bool {
        self.key().cmp(&other.key()) == Ordering::Less
    }
}

#[derive(Debug)]
pub struct EventScheduler<T> {
    heap: Vec<ScheduledEntry<T>>,
    capacity: usize,
    next_sequence: u64,
}

impl<T> EventScheduler<T> {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            heap: Vec::with_capacity(capacity),
            capacity,
            next_sequence: 0,
        }
    }

    /// Inserts `payload` to fire at `time`. O(log n), plus an amortized O(1)
    /// doubling when the backing storage is full.
    pub fn schedule(&mut self, payload: T, time: SimTime) {
        if self.heap.len() == self.capacity {
            self.grow();
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.heap.push(ScheduledEntry { payload, time, sequence });
        self.sift_up(self.heap.len() - 1);
    }

    pub fn pop(&mut self) -> Result<ScheduledEntry<T>, SchedulerError> {
        if self.heap.is_empty() {
            return Err(SchedulerError::EmptyQueue);
        }

        let entry = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Ok(entry)
    }

    pub fn peek(&self) -> Result<&ScheduledEntry<T>, SchedulerError> {
        self.heap.first().ok_or(SchedulerError::EmptyQueue)
    }

    pub fn peek_time(&self) -> Result<SimTime, SchedulerError> {
        self.peek().map(|entry| entry.time)
    }

    pub fn size(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every pending entry. The insertion counter keeps running so
    /// entries scheduled afterwards still order after anything popped before.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    fn grow(&mut self) {
        // Moving the entries into a bigger buffer keeps their positions, so the
        // heap property survives untouched.
        self.capacity *= 2;
        self.heap.reserve_exact(self.capacity - self.heap.len());
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.heap[parent].precedes(&self.heap[index]) {
                break;
            }
            self.heap.swap(parent, index);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            if left >= len {
                break;
            }

            let mut child = left;
            if right < len && self.heap[right].precedes(&self.heap[left]) {
                child = right;
            }
            if self.heap[index].precedes(&self.heap[child]) {
                break;
            }
            self.heap.swap(child, index);
            index = child;
        }
    }
}

impl<T> Default for EventScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
