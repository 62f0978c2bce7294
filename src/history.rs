use std::collections::vec_deque;
use std::collections::VecDeque;

use crate::models::Sample;

/// Roughly eight hours of samples at the default 1.5 s interval.
pub const DEFAULT_CAPACITY: usize = 20_000;

/// Capacity-bounded, chronologically ordered sample history.
///
/// Appending past capacity evicts the oldest sample. Each buffer has a single
/// owner that appends to it, so no synchronisation is involved.
#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn append(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// The most recent `min(max, len)` samples, oldest first.
    pub fn snapshot(&self, max: usize) -> vec_deque::Iter<'_, Sample> {
        let start = self.samples.len().saturating_sub(max);
        self.samples.range(start..)
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
