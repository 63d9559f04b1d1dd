//! Keyed mutual exclusion for placement state.
//!
//! One mutex per node id (and per cluster id) so events touching the same
//! node never interleave while unrelated nodes proceed in parallel.
//! Callers always take a cluster lock before node locks, and node locks in
//! sorted order, so concurrent cascades cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct LockRegistry {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().expect("lock registry");
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Drop the slot for `key` once no caller references it any more.
    fn release(&self, key: &str, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().expect("lock registry");
        // One reference in the map, one in `slot`.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
    }

    /// Number of keys currently locked or waited on.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("lock registry").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let slot = self.slot(key);
        let result = {
            let _guard = slot.lock().expect("placement lock");
            f()
        };
        self.release(key, slot);
        result
    }

    /// Run `f` while holding the locks for every key, taken in sorted order.
    pub fn with_all<T>(&self, keys: &[&str], f: impl FnOnce() -> T) -> T {
        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let slots: Vec<Arc<Mutex<()>>> = sorted.iter().map(|k| self.slot(k)).collect();
        let result = {
            let _guards: Vec<MutexGuard<'_, ()>> = slots
                .iter()
                .map(|s| s.lock().expect("placement lock"))
                .collect();
            f()
        };
        for (key, slot) in sorted.into_iter().zip(slots) {
            self.release(key, slot);
        }
        result
    }
}
