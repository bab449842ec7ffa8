//! A single override level of property values.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::event::StackEvent;
use crate::property::PropertyKey;
use crate::reference::PropertyValue;
use crate::signal::SignalBus;
use crate::sweeper::Sweep;

/// A shared mapping from [`PropertyKey`] to [`PropertyValue`].
///
/// A layer can sit in any number of stacks at once (a theme overlaid on
/// several holders, or a group's defaults). Every mutation emits one
/// [`StackEvent`] on [`changes`](Self::changes) listing the keys whose value
/// in this layer changed.
pub struct Layer {
    name: String,
    entries: RwLock<HashMap<PropertyKey, PropertyValue>>,
    signal: Arc<SignalBus<StackEvent>>,
}

impl Layer {
    /// Create an unnamed, empty layer.
    pub fn new() -> Arc<Self> {
        Self::named(String::new())
    }

    /// Create an empty layer with a diagnostic name.
    pub fn named(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
            signal: Arc::new(SignalBus::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &PropertyKey) -> Option<PropertyValue> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &PropertyKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<PropertyKey> {
        self.entries.read().keys().cloned().collect()
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> Vec<(PropertyKey, PropertyValue)> {
        self.entries
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Store `value` at `key`, returning the previous value.
    pub fn set(&self, key: PropertyKey, value: PropertyValue) -> Option<PropertyValue> {
        let mut previous = None;
        self.apply(|entries, event| {
            previous = entries.insert(key.clone(), value.clone());
            event.record(key, previous.clone(), Some(value));
        });
        previous
    }

    /// Remove the value at `key`, returning it.
    pub fn remove(&self, key: &PropertyKey) -> Option<PropertyValue> {
        let mut previous = None;
        self.apply(|entries, event| {
            previous = entries.remove(key);
            event.record(key.clone(), previous.clone(), None);
        });
        previous
    }

    /// Apply several writes as one mutation with a single event.
    ///
    /// `None` removes the key.
    pub fn update<I>(&self, batch: I)
    where
        I: IntoIterator<Item = (PropertyKey, Option<PropertyValue>)>,
    {
        self.apply(|entries, event| {
            for (key, value) in batch {
                let previous = match &value {
                    Some(value) => entries.insert(key.clone(), value.clone()),
                    None => entries.remove(&key),
                };
                event.record(key, previous, value);
            }
        });
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.apply(|entries, event| {
            for (key, value) in entries.drain() {
                event.record(key, Some(value), None);
            }
        });
    }

    fn apply<F>(&self, mutate: F)
    where
        F: FnOnce(&mut HashMap<PropertyKey, PropertyValue>, &mut StackEvent),
    {
        let mut event = StackEvent::new();
        {
            let mut entries = self.entries.write();
            mutate(&mut entries, &mut event);
        }
        if !event.is_empty() {
            tracing::trace!(target: "lattice_props::stack", layer = %self.name, changed = event.len(), "layer changed");
            self.signal.emit(&event);
        }
    }

    /// The bus this layer emits its changes on.
    pub fn changes(&self) -> &Arc<SignalBus<StackEvent>> {
        &self.signal
    }
}

impl Sweep for Layer {
    fn sweep(&self) -> usize {
        self.signal.sweep()
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(Layer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use parking_lot::Mutex;

    fn simple(v: i64) -> PropertyValue {
        PropertyValue::Simple(Value::Int(v))
    }

    #[test]
    fn test_set_get_remove() {
        let layer = Layer::new();
        let key = PropertyKey::new("x");

        assert_eq!(layer.set(key.clone(), simple(1)), None);
        assert_eq!(layer.set(key.clone(), simple(2)), Some(simple(1)));
        assert_eq!(layer.get(&key), Some(simple(2)));
        assert_eq!(layer.remove(&key), Some(simple(2)));
        assert!(layer.is_empty());
    }

    #[test]
    fn test_mutations_emit_single_batches() {
        let layer = Layer::new();
        let a = PropertyKey::new("a");
        let b = PropertyKey::new("b");
        let events = Arc::new(Mutex::new(Vec::new()));
        {
            let events = events.clone();
            layer
                .changes()
                .subscribe_strong(move |event: &StackEvent| events.lock().push(event.clone()));
        }

        layer.update([(a.clone(), Some(simple(1))), (b.clone(), Some(simple(2)))]);
        layer.set(a.clone(), simple(1));
        layer.remove(&b);

        let events = events.lock();
        // Re-setting an identical value is silent.
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].len(), 2);
        assert_eq!(events[1].get(&b).map(|c| c.new.clone()), Some(None));
    }

    #[test]
    fn test_clear_reports_every_key() {
        let layer = Layer::new();
        let a = PropertyKey::new("a");
        let b = PropertyKey::new("b");
        layer.set(a.clone(), simple(1));
        layer.set(b.clone(), simple(2));

        let count = Arc::new(Mutex::new(0));
        {
            let count = count.clone();
            layer
                .changes()
                .subscribe_strong(move |event: &StackEvent| *count.lock() += event.len());
        }
        layer.clear();
        assert_eq!(*count.lock(), 2);
    }
}
