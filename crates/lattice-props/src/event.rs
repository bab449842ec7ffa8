//! Batched change notifications.

use std::collections::BTreeMap;
use std::collections::btree_map;

use crate::property::PropertyKey;
use crate::reference::PropertyValue;
use crate::value::Value;

/// The old and new effective value of one key.
#[derive(Clone, Debug, PartialEq)]
pub struct Change<V> {
    pub old: Option<V>,
    pub new: Option<V>,
}

/// Every key that changed in one mutation, delivered as a single batch.
///
/// Entries whose old and new values are equal are never stored, so an event
/// only lists keys whose externally visible value actually moved.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent<V> {
    changes: BTreeMap<PropertyKey, Change<V>>,
}

/// Change event emitted by layers and stacks.
pub type StackEvent = ChangeEvent<PropertyValue>;

/// Change event emitted by holders, carrying resolved values.
pub type HolderEvent = ChangeEvent<Value>;

impl<V: PartialEq> ChangeEvent<V> {
    /// Create an empty event.
    pub fn new() -> Self {
        Self {
            changes: BTreeMap::new(),
        }
    }

    /// Record that `key` moved from `old` to `new`.
    ///
    /// Recording the same key twice keeps the first `old` and the latest
    /// `new`; if those end up equal the key is dropped from the event.
    pub fn record(&mut self, key: PropertyKey, old: Option<V>, new: Option<V>) {
        match self.changes.entry(key) {
            btree_map::Entry::Occupied(mut entry) => {
                if entry.get().old == new {
                    entry.remove();
                } else {
                    entry.get_mut().new = new;
                }
            }
            btree_map::Entry::Vacant(entry) => {
                if old != new {
                    entry.insert(Change { old, new });
                }
            }
        }
    }

    /// Fold every entry of `other` into this event.
    pub fn merge(&mut self, other: ChangeEvent<V>) {
        for (key, change) in other.changes {
            self.record(key, change.old, change.new);
        }
    }
}

impl<V> ChangeEvent<V> {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// The change recorded for `key`, if any.
    pub fn get(&self, key: &PropertyKey) -> Option<&Change<V>> {
        self.changes.get(key)
    }

    pub fn contains(&self, key: &PropertyKey) -> bool {
        self.changes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.changes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyKey, &Change<V>)> {
        self.changes.iter()
    }
}

impl<V: PartialEq> Default for ChangeEvent<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IntoIterator for ChangeEvent<V> {
    type Item = (PropertyKey, Change<V>);
    type IntoIter = btree_map::IntoIter<PropertyKey, Change<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}
