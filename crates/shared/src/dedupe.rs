//! Bounded insertion-ordered dedup window.
//!
//! Inbound hubs use this to suppress duplicate provider events. Eviction is
//! explicit FIFO: when the window is full, the oldest batch of entries is
//! pruned in insertion order.

use std::collections::{HashSet, VecDeque};

/// Default maximum number of tracked event ids per hub.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Default number of oldest entries pruned when the window fills.
pub const DEFAULT_PRUNE_BATCH: usize = 1_000;

/// A bounded set of recently seen event ids with FIFO eviction.
#[derive(Debug)]
pub struct DedupeWindow {
    capacity: usize,
    prune_batch: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl DedupeWindow {
    pub fn new(capacity: usize, prune_batch: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            prune_batch: prune_batch.max(1),
            order: VecDeque::with_capacity(capacity.min(1024)),
            seen: HashSet::with_capacity(capacity.min(1024)),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record `id`, pruning the oldest batch first if the window is full.
    ///
    /// Returns false if the id was already present (nothing is recorded).
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.seen.contains(&id) {
            return false;
        }

        if self.order.len() >= self.capacity {
            self.prune();
        }

        self.order.push_back(id.clone());
        self.seen.insert(id);
        true
    }

    fn prune(&mut self) {
        for _ in 0..self.prune_batch {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.seen.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for DedupeWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_PRUNE_BATCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut window = DedupeWindow::default();
        assert!(window.insert("evt_1"));
        assert!(!window.insert("evt_1"));
        assert!(window.contains("evt_1"));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut window = DedupeWindow::default();
        for i in 0..(DEFAULT_CAPACITY + 500) {
            window.insert(format!("evt_{}", i));
            assert!(window.len() <= DEFAULT_CAPACITY);
        }
    }

    #[test]
    fn pruning_evicts_oldest_batch_in_insertion_order() {
        let mut window = DedupeWindow::new(10, 3);
        for i in 0..10 {
            window.insert(format!("evt_{}", i));
        }
        // Window is full; the next insert evicts evt_0..evt_2.
        window.insert("evt_10");
        assert!(!window.contains("evt_0"));
        assert!(!window.contains("evt_1"));
        assert!(!window.contains("evt_2"));
        assert!(window.contains("evt_3"));
        assert!(window.contains("evt_10"));
        assert_eq!(window.len(), 8);
    }

    #[test]
    fn evicted_ids_can_be_inserted_again() {
        let mut window = DedupeWindow::new(2, 1);
        window.insert("a");
        window.insert("b");
        window.insert("c"); // evicts "a"
        assert!(window.insert("a"));
    }
}
