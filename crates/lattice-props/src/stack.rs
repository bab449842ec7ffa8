//! Ordered layer composition with shadow-aware change aggregation.
//!
//! A [`MapStack`] holds layers in precedence order: index 0 wins. The
//! effective value of a key is the value in the first layer that contains
//! it.
//!
//! # Change Notification
//!
//! The stack re-emits layer changes on its own bus, translated into changes
//! of the *effective* value. A change in a layer that is shadowed by a layer
//! above it is dropped, and a removal falls through to the next layer below
//! that holds the key. Inserting or removing a layer emits one event covering
//! exactly the keys whose effective value moves.
//!
//! Per-layer listeners are only attached while the stack's own bus has
//! subscribers. When the last subscriber leaves (including a weak one being
//! swept), the stack detaches from every layer, so an unobserved stack costs
//! its layers nothing.
//!
//! # Example
//!
//! ```
//! use lattice_props::{Layer, MapStack, PropertyKey, PropertyValue, StackEvent};
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! let top = Layer::new();
//! let bottom = Layer::new();
//! let stack = MapStack::new();
//! stack.push_layer(top.clone());
//! stack.push_layer(bottom.clone());
//!
//! let key = PropertyKey::new("width");
//! let seen = Arc::new(Mutex::new(0));
//! let _sub = {
//!     let seen = seen.clone();
//!     stack.changes().subscribe_scoped(move |event: &StackEvent| *seen.lock() += event.len())
//! };
//!
//! top.set(key.clone(), PropertyValue::simple(1));
//! // Shadowed by `top`, so nothing is reported.
//! bottom.set(key.clone(), PropertyValue::simple(2));
//! assert_eq!(*seen.lock(), 1);
//! assert_eq!(stack.effective(&key), Some(PropertyValue::simple(1)));
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::PropertyError;
use crate::event::StackEvent;
use crate::layer::Layer;
use crate::property::PropertyKey;
use crate::reference::PropertyValue;
use crate::signal::{SignalBus, Subscription};
use crate::sweeper::Sweep;

struct LayerSlot {
    /// Stable identity of this position, independent of its index.
    id: u64,
    layer: Arc<Layer>,
    subscription: Option<Subscription<StackEvent>>,
}

struct StackState {
    slots: Vec<LayerSlot>,
    /// Whether per-layer listeners are currently attached.
    attached: bool,
}

/// An ordered stack of shared [`Layer`]s.
pub struct MapStack {
    state: RwLock<StackState>,
    signal: Arc<SignalBus<StackEvent>>,
    next_slot: AtomicU64,
    this: Weak<MapStack>,
}

impl MapStack {
    /// Create an empty stack.
    pub fn new() -> Arc<Self> {
        let stack = Arc::new_cyclic(|this: &Weak<MapStack>| Self {
            state: RwLock::new(StackState {
                slots: Vec::new(),
                attached: false,
            }),
            signal: Arc::new(SignalBus::new()),
            next_slot: AtomicU64::new(0),
            this: this.clone(),
        });

        let on_first = stack.this.clone();
        let on_last = stack.this.clone();
        stack.signal.set_activation_hooks(
            move || {
                if let Some(stack) = on_first.upgrade() {
                    stack.attach_all();
                }
            },
            move || {
                if let Some(stack) = on_last.upgrade() {
                    stack.detach_all();
                }
            },
        );
        stack
    }

    /// Create a stack from layers given in precedence order.
    pub fn with_layers<I>(layers: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Arc<Layer>>,
    {
        let stack = Self::new();
        {
            let mut state = stack.state.write();
            for layer in layers {
                let id = stack.next_slot.fetch_add(1, Ordering::Relaxed);
                state.slots.push(LayerSlot {
                    id,
                    layer,
                    subscription: None,
                });
            }
        }
        stack
    }

    /// The effective value of `key`: the value in the first layer holding it.
    pub fn effective(&self, key: &PropertyKey) -> Option<PropertyValue> {
        scan(&self.state.read().slots, key)
    }

    /// Whether any layer holds `key`.
    pub fn contains(&self, key: &PropertyKey) -> bool {
        self.state.read().slots.iter().any(|slot| slot.layer.contains(key))
    }

    /// Union of the keys of every layer.
    pub fn keys(&self) -> BTreeSet<PropertyKey> {
        self.state
            .read()
            .slots
            .iter()
            .flat_map(|slot| slot.layer.keys())
            .collect()
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.state.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().slots.is_empty()
    }

    pub fn layer(&self, index: usize) -> Option<Arc<Layer>> {
        self.state
            .read()
            .slots
            .get(index)
            .map(|slot| slot.layer.clone())
    }

    /// Every layer in precedence order.
    pub fn layers(&self) -> Vec<Arc<Layer>> {
        self.state
            .read()
            .slots
            .iter()
            .map(|slot| slot.layer.clone())
            .collect()
    }

    /// Position of `layer` (by identity), if it is in the stack.
    pub fn index_of(&self, layer: &Arc<Layer>) -> Option<usize> {
        self.state
            .read()
            .slots
            .iter()
            .position(|slot| Arc::ptr_eq(&slot.layer, layer))
    }

    /// Whether per-layer listeners are attached.
    pub fn is_observed(&self) -> bool {
        self.state.read().attached
    }

    /// The bus carrying effective-value changes.
    pub fn changes(&self) -> &Arc<SignalBus<StackEvent>> {
        &self.signal
    }

    /// Append `layer` with the lowest precedence.
    pub fn push_layer(&self, layer: Arc<Layer>) {
        let mut state = self.state.write();
        let index = state.slots.len();
        let event = self.insert_locked(&mut state, index, layer);
        drop(state);
        self.emit(event);
    }

    /// Insert `layer` at `index`, shifting lower layers down.
    ///
    /// Fails with [`PropertyError::LayerIndexOutOfRange`] when `index` is
    /// greater than the number of layers.
    #[tracing::instrument(skip(self, layer), target = "lattice_props::stack", level = "trace")]
    pub fn insert_layer(&self, index: usize, layer: Arc<Layer>) -> Result<(), PropertyError> {
        let mut state = self.state.write();
        let len = state.slots.len();
        if index > len {
            return Err(PropertyError::LayerIndexOutOfRange { index, len });
        }
        let event = self.insert_locked(&mut state, index, layer);
        drop(state);
        self.emit(event);
        Ok(())
    }

    fn insert_locked(&self, state: &mut StackState, index: usize, layer: Arc<Layer>) -> StackEvent {
        let mut event = StackEvent::new();
        if state.attached {
            for (key, value) in layer.entries() {
                if is_shadowed(&state.slots[..index], &key) {
                    continue;
                }
                let old = scan(&state.slots[index..], &key);
                event.record(key, old, Some(value));
            }
        }

        let id = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let subscription = state.attached.then(|| self.listen(id, &layer));
        state.slots.insert(
            index,
            LayerSlot {
                id,
                layer,
                subscription,
            },
        );
        event
    }

    /// Remove and return the layer at `index`.
    ///
    /// Fails with [`PropertyError::LayerIndexOutOfRange`] when `index` is not
    /// a valid position.
    #[tracing::instrument(skip(self), target = "lattice_props::stack", level = "trace")]
    pub fn remove_layer(&self, index: usize) -> Result<Arc<Layer>, PropertyError> {
        let (slot, event) = {
            let mut state = self.state.write();
            let len = state.slots.len();
            if index >= len {
                return Err(PropertyError::LayerIndexOutOfRange { index, len });
            }
            let slot = state.slots.remove(index);

            let mut event = StackEvent::new();
            if state.attached {
                for (key, value) in slot.layer.entries() {
                    if is_shadowed(&state.slots[..index], &key) {
                        continue;
                    }
                    let new = scan(&state.slots[index..], &key);
                    event.record(key, Some(value), new);
                }
            }
            (slot, event)
        };

        let LayerSlot {
            layer, subscription, ..
        } = slot;
        drop(subscription);
        self.emit(event);
        Ok(layer)
    }

    /// Remove `layer` (by identity). Returns `false` if it is not in the stack.
    pub fn remove(&self, layer: &Arc<Layer>) -> bool {
        match self.index_of(layer) {
            Some(index) => self.remove_layer(index).is_ok(),
            None => false,
        }
    }

    fn emit(&self, event: StackEvent) {
        if !event.is_empty() {
            self.signal.emit(&event);
        }
    }

    fn listen(&self, slot_id: u64, layer: &Arc<Layer>) -> Subscription<StackEvent> {
        let stack = self.this.clone();
        layer.changes().subscribe_scoped(move |event: &StackEvent| {
            if let Some(stack) = stack.upgrade() {
                stack.on_layer_changed(slot_id, event);
            }
        })
    }

    fn attach_all(&self) {
        let mut state = self.state.write();
        if state.attached {
            return;
        }
        state.attached = true;
        for index in 0..state.slots.len() {
            let slot = &state.slots[index];
            let subscription = self.listen(slot.id, &slot.layer);
            state.slots[index].subscription = Some(subscription);
        }
        tracing::trace!(target: "lattice_props::stack", layers = state.slots.len(), "attached layer listeners");
    }

    fn detach_all(&self) {
        let subscriptions: Vec<_> = {
            let mut state = self.state.write();
            if !state.attached {
                return;
            }
            state.attached = false;
            state
                .slots
                .iter_mut()
                .filter_map(|slot| slot.subscription.take())
                .collect()
        };
        tracing::trace!(target: "lattice_props::stack", layers = subscriptions.len(), "detached layer listeners");
        drop(subscriptions);
    }

    fn on_layer_changed(&self, slot_id: u64, event: &StackEvent) {
        let forwarded = {
            let state = self.state.read();
            let Some(index) = state.slots.iter().position(|slot| slot.id == slot_id) else {
                return;
            };
            let below = &state.slots[index + 1..];

            let mut forwarded = StackEvent::new();
            for (key, change) in event.iter() {
                if is_shadowed(&state.slots[..index], key) {
                    continue;
                }
                let old = change.old.clone().or_else(|| scan(below, key));
                let new = change.new.clone().or_else(|| scan(below, key));
                forwarded.record(key.clone(), old, new);
            }
            forwarded
        };
        self.emit(forwarded);
    }
}

fn scan(slots: &[LayerSlot], key: &PropertyKey) -> Option<PropertyValue> {
    slots.iter().find_map(|slot| slot.layer.get(key))
}

fn is_shadowed(above: &[LayerSlot], key: &PropertyKey) -> bool {
    above.iter().any(|slot| slot.layer.contains(key))
}

impl Sweep for MapStack {
    fn sweep(&self) -> usize {
        self.signal.sweep()
    }
}

impl fmt::Debug for MapStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MapStack")
            .field(
                "layers",
                &state.slots.iter().map(|slot| slot.layer.name()).collect::<Vec<_>>(),
            )
            .field("attached", &state.attached)
            .finish()
    }
}

static_assertions::assert_impl_all!(MapStack: Send, Sync);
