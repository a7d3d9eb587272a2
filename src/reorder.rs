//! Index-gated reordering buffer.
//!
//! Parallel workers finish batches in any order; the committer pushes each
//! completed item with its sequence index and pops items only when their
//! predecessor has been released. Output order is therefore exactly
//! `0, 1, 2, ...` regardless of completion order.

use std::collections::BTreeMap;

#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: u64,
    pending: BTreeMap<u64, T>,
    high_water: usize,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
            high_water: 0,
        }
    }

    /// Accept a completed item. Returns `false` (and drops the item) if `seq`
    /// was already released or is already pending.
    pub fn push(&mut self, seq: u64, item: T) -> bool {
        if seq < self.next || self.pending.contains_key(&seq) {
            return false;
        }
        self.pending.insert(seq, item);
        self.high_water = self.high_water.max(self.pending.len());
        true
    }

    /// Release the next item in sequence, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(u64, T)> {
        let item = self.pending.remove(&self.next)?;
        let seq = self.next;
        self.next += 1;
        Some((seq, item))
    }

    /// Release every item that is now contiguous with what was already released.
    pub fn drain_ready(&mut self) -> Vec<(u64, T)> {
        std::iter::from_fn(|| self.pop_ready()).collect()
    }

    /// Sequence index the buffer is waiting for.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Largest number of items ever held at once.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}
