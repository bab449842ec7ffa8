//! A compacting set of weakly-held entries.
//!
//! [`WeakEntrySet`] never keeps its entries alive. Entries whose referent has
//! been dropped stay in the backing storage until the next compaction, which
//! happens opportunistically on `remove`, `each`, `to_list`, `is_empty` and
//! when `add` runs out of room. Compaction reallocates the storage to
//! `live * 3 / 2 + 1` slots, so indices are never stable across calls.

use std::fmt;
use std::sync::{Arc, Weak};

/// A set of weak references with lazy, amortized cleanup.
///
/// Entries are compared by allocation identity. Iteration order is
/// unspecified.
pub struct WeakEntrySet<T: ?Sized> {
    entries: Vec<Weak<T>>,
    /// Logical capacity; reaching it triggers a compaction before growth.
    capacity: usize,
}

impl<T: ?Sized> WeakEntrySet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::with_capacity(1)
    }

    /// Create an empty set with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add an entry. Adding an entry that is already present does nothing.
    pub fn add(&mut self, item: &Arc<T>) {
        if self.contains(item) {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.compact();
            if self.entries.len() >= self.capacity {
                self.resize(self.entries.len());
            }
        }
        self.entries.push(Arc::downgrade(item));
    }

    /// Remove an entry, returning `true` if it was present.
    pub fn remove(&mut self, item: &Arc<T>) -> bool {
        let target = Arc::downgrade(item);
        let before = self.entries.len();
        self.entries.retain(|entry| !Weak::ptr_eq(entry, &target));
        let removed = self.entries.len() != before;
        self.compact();
        removed
    }

    /// Whether `item` is currently in the set.
    pub fn contains(&self, item: &Arc<T>) -> bool {
        let target = Arc::downgrade(item);
        self.entries.iter().any(|entry| Weak::ptr_eq(entry, &target))
    }

    /// Visit every live entry.
    pub fn each<F>(&mut self, mut visit: F)
    where
        F: FnMut(&Arc<T>),
    {
        self.compact();
        for entry in &self.entries {
            if let Some(item) = entry.upgrade() {
                visit(&item);
            }
        }
    }

    /// Whether the set has no live entries.
    pub fn is_empty(&mut self) -> bool {
        self.compact();
        self.entries.is_empty()
    }

    /// Collect strong references to every live entry.
    pub fn to_list(&mut self) -> Vec<Arc<T>> {
        self.compact();
        self.entries.iter().filter_map(Weak::upgrade).collect()
    }

    /// Number of entries whose referent is still alive.
    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    /// Number of stored entries, dead ones included.
    pub fn stored_count(&self) -> usize {
        self.entries.len()
    }

    /// Current logical capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn compact(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.strong_count() > 0);
        if self.entries.len() != before {
            self.resize(self.entries.len());
        }
    }

    fn resize(&mut self, live: usize) {
        self.capacity = live * 3 / 2 + 1;
        if self.entries.capacity() > self.capacity {
            self.entries.shrink_to(self.capacity);
        } else {
            self.entries.reserve_exact(self.capacity - self.entries.len());
        }
    }
}

impl<T: ?Sized> Default for WeakEntrySet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for WeakEntrySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEntrySet")
            .field("live", &self.live_count())
            .field("stored", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
