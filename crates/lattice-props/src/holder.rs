//! The holder tree.
//!
//! Holders are the objects that carry properties. Each holder belongs to one
//! [`PropertyGroup`] and owns a [`MapStack`] laid out as
//!
//! ```text
//! [ own layer, overlay N, .., overlay 1, group defaults ]
//! ```
//!
//! so values set directly on the holder win over overlays (themes), the most
//! recently added overlay wins over older ones, and declared defaults come
//! last.
//!
//! Holders are stored in a generation-checked arena. Parent links and object
//! values are plain [`HolderId`] lookups, never ownership edges, so
//! references between holders can form arbitrary graphs without keeping
//! anything alive. Destroying a holder destroys its subtree.
//!
//! # Change Notification
//!
//! [`HolderTree::subscribe`] delivers [`HolderEvent`]s carrying *resolved*
//! values: a property that references another holder reports a change when
//! the referenced property changes, under its own key. While a holder is
//! observed it keeps one link per reference-valued property, subscribed to
//! the target holder; the links are rebuilt whenever the holder's stack or
//! the tree topology changes and are all released when the last subscriber
//! leaves.
//!
//! # Example
//!
//! ```
//! use lattice_props::{HolderTree, PropertyGroup, PropertyValue, TargetAddress, Value, ValueType};
//!
//! # fn main() -> Result<(), lattice_props::Error> {
//! let group = PropertyGroup::builder("Panel")
//!     .property_with_default("background", ValueType::Color, Value::Color(0xffffffff))
//!     .build()?;
//! let background = group.key("background").unwrap();
//! let decl = group.decl(&background).unwrap();
//!
//! let tree = HolderTree::new();
//! let window = tree.create(group.clone());
//! let panel = tree.create_child(group.clone(), window)?;
//!
//! // The panel follows its parent's background.
//! tree.set(panel, &background, PropertyValue::reference(decl, TargetAddress::Parent, decl)?)?;
//! tree.set_value(window, &background, Value::Color(0x202020ff))?;
//! assert_eq!(tree.get(panel, &background)?, Some(Value::Color(0x202020ff)));
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use slotmap::{SlotMap, new_key_type};

use crate::error::PropertyError;
use crate::event::{HolderEvent, StackEvent};
use crate::layer::Layer;
use crate::property::{PropertyDecl, PropertyGroup, PropertyKey};
use crate::reference::{MAX_RESOLVE_DEPTH, PropertyValue};
use crate::signal::{Listener, SignalBus, Subscription, SubscriptionId};
use crate::stack::MapStack;
use crate::value::Value;

new_key_type! {
    /// A generation-checked handle to a holder in a [`HolderTree`].
    ///
    /// A handle to a destroyed holder never aliases a newer one.
    pub struct HolderId;
}

/// A reference-valued property being followed on behalf of its holder.
struct ReferenceLink {
    value: PropertyValue,
    /// Every `(holder, property)` the resolved value depends on: object
    /// properties read by the address, then each target along the fallback
    /// chain.
    watches: Vec<(HolderId, PropertyKey)>,
    /// Last resolved value reported for the referencing key.
    resolved: Option<Value>,
    subscriptions: Vec<Subscription<HolderEvent>>,
}

#[derive(Default)]
struct Observation {
    stack: Option<Subscription<StackEvent>>,
    links: HashMap<PropertyKey, ReferenceLink>,
}

struct HolderData {
    group: Arc<PropertyGroup>,
    parent: Option<HolderId>,
    children: Vec<HolderId>,
    own: Arc<Layer>,
    stack: Arc<MapStack>,
    signal: Arc<SignalBus<HolderEvent>>,
    observation: Arc<Mutex<Observation>>,
}

struct TreeShared {
    holders: RwLock<SlotMap<HolderId, HolderData>>,
}

/// An arena of property holders.
///
/// `HolderTree` is a cheap, cloneable handle; clones share the same arena.
/// Mutation of one tree is expected to happen from one thread at a time.
#[derive(Clone)]
pub struct HolderTree {
    shared: Arc<TreeShared>,
}

impl Default for HolderTree {
    fn default() -> Self {
        Self::new()
    }
}

impl HolderTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TreeShared {
                holders: RwLock::new(SlotMap::with_key()),
            }),
        }
    }

    fn downgrade(&self) -> Weak<TreeShared> {
        Arc::downgrade(&self.shared)
    }

    fn upgrade(shared: &Weak<TreeShared>) -> Option<Self> {
        shared.upgrade().map(|shared| Self { shared })
    }

    fn with_holder<R>(&self, id: HolderId, f: impl FnOnce(&HolderData) -> R) -> Result<R, PropertyError> {
        self.shared
            .holders
            .read()
            .get(id)
            .map(f)
            .ok_or(PropertyError::InvalidHolder)
    }

    // =========================================================================
    // Tree structure
    // =========================================================================

    /// Create a root holder of `group`.
    pub fn create(&self, group: Arc<PropertyGroup>) -> HolderId {
        self.insert(group, None)
    }

    /// Create a holder of `group` under `parent`.
    pub fn create_child(&self, group: Arc<PropertyGroup>, parent: HolderId) -> Result<HolderId, PropertyError> {
        if !self.contains(parent) {
            return Err(PropertyError::InvalidHolder);
        }
        Ok(self.insert(group, Some(parent)))
    }

    fn insert(&self, group: Arc<PropertyGroup>, parent: Option<HolderId>) -> HolderId {
        let own = Layer::named(group.name());
        let stack = MapStack::with_layers([own.clone(), group.defaults_layer().clone()]);
        let signal = Arc::new(SignalBus::new());

        let id = {
            let mut holders = self.shared.holders.write();
            let id = holders.insert(HolderData {
                group,
                parent,
                children: Vec::new(),
                own,
                stack,
                signal: signal.clone(),
                observation: Arc::new(Mutex::new(Observation::default())),
            });
            if let Some(parent_data) = parent.and_then(|parent| holders.get_mut(parent)) {
                parent_data.children.push(id);
            }
            id
        };

        let on_first = self.downgrade();
        let on_last = self.downgrade();
        signal.set_activation_hooks(
            move || {
                if let Some(tree) = Self::upgrade(&on_first) {
                    tree.activate(id);
                }
            },
            move || {
                if let Some(tree) = Self::upgrade(&on_last) {
                    tree.deactivate(id);
                }
            },
        );

        tracing::trace!(target: "lattice_props::holder", ?id, ?parent, "created holder");
        id
    }

    /// Destroy a holder and its whole subtree.
    #[tracing::instrument(skip(self), target = "lattice_props::holder", level = "trace")]
    pub fn destroy(&self, id: HolderId) -> Result<(), PropertyError> {
        let removed = {
            let mut holders = self.shared.holders.write();
            let mut doomed = Vec::new();
            collect_descendants(&holders, id, &mut doomed)?;

            if let Some(parent) = holders.get(id).and_then(|data| data.parent) {
                if let Some(parent_data) = holders.get_mut(parent) {
                    parent_data.children.retain(|&child| child != id);
                }
            }

            doomed.push(id);
            doomed
                .into_iter()
                .filter_map(|doomed| holders.remove(doomed))
                .collect::<Vec<_>>()
        };
        tracing::trace!(target: "lattice_props::holder", ?id, count = removed.len(), "destroyed holder tree");

        // Releasing links may fire other holders' deactivation hooks.
        drop(removed);
        self.relink_holders(self.ids());
        Ok(())
    }

    /// Whether `id` refers to a live holder.
    pub fn contains(&self, id: HolderId) -> bool {
        self.shared.holders.read().contains_key(id)
    }

    /// Number of live holders.
    pub fn len(&self) -> usize {
        self.shared.holders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.holders.read().is_empty()
    }

    fn ids(&self) -> Vec<HolderId> {
        self.shared.holders.read().keys().collect()
    }

    /// Move a holder under `new_parent`, or make it a root with `None`.
    ///
    /// References in the moved subtree are re-bound and subscribers see any
    /// resolved value that changed with the new topology.
    pub fn set_parent(&self, id: HolderId, new_parent: Option<HolderId>) -> Result<(), PropertyError> {
        {
            let mut holders = self.shared.holders.write();
            if !holders.contains_key(id) {
                return Err(PropertyError::InvalidHolder);
            }

            if let Some(parent_id) = new_parent {
                if !holders.contains_key(parent_id) {
                    return Err(PropertyError::InvalidHolder);
                }
                if is_ancestor_of(&holders, id, parent_id) {
                    return Err(PropertyError::CircularParentage);
                }
            }

            let old_parent = holders.get(id).and_then(|data| data.parent);
            if old_parent == new_parent {
                return Ok(());
            }
            if let Some(parent_data) = old_parent.and_then(|parent| holders.get_mut(parent)) {
                parent_data.children.retain(|&child| child != id);
            }
            if let Some(data) = holders.get_mut(id) {
                data.parent = new_parent;
            }
            if let Some(parent_data) = new_parent.and_then(|parent| holders.get_mut(parent)) {
                parent_data.children.push(id);
            }
        }
        tracing::trace!(target: "lattice_props::holder", ?id, ?new_parent, "reparented holder");

        self.relink_holders(self.ids());
        Ok(())
    }

    pub fn parent(&self, id: HolderId) -> Result<Option<HolderId>, PropertyError> {
        self.with_holder(id, |data| data.parent)
    }

    pub fn children(&self, id: HolderId) -> Result<Vec<HolderId>, PropertyError> {
        self.with_holder(id, |data| data.children.clone())
    }

    /// Every holder without a parent.
    pub fn roots(&self) -> Vec<HolderId> {
        self.shared
            .holders
            .read()
            .iter()
            .filter(|(_, data)| data.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn group(&self, id: HolderId) -> Result<Arc<PropertyGroup>, PropertyError> {
        self.with_holder(id, |data| data.group.clone())
    }

    /// The layer holding values set directly on the holder.
    pub fn own_layer(&self, id: HolderId) -> Result<Arc<Layer>, PropertyError> {
        self.with_holder(id, |data| data.own.clone())
    }

    pub fn stack(&self, id: HolderId) -> Result<Arc<MapStack>, PropertyError> {
        self.with_holder(id, |data| data.stack.clone())
    }

    // =========================================================================
    // Layers and values
    // =========================================================================

    /// Overlay `layer` below the holder's own values and above older overlays.
    pub fn add_overlay(&self, id: HolderId, layer: Arc<Layer>) -> Result<(), PropertyError> {
        self.stack(id)?.insert_layer(1, layer)
    }

    /// Remove an overlay added with [`add_overlay`](Self::add_overlay).
    ///
    /// Returns `false` if `layer` is not an overlay of this holder.
    pub fn remove_overlay(&self, id: HolderId, layer: &Arc<Layer>) -> Result<bool, PropertyError> {
        let (own, stack, group) = self.with_holder(id, |data| {
            (data.own.clone(), data.stack.clone(), data.group.clone())
        })?;
        if Arc::ptr_eq(&own, layer) || Arc::ptr_eq(group.defaults_layer(), layer) {
            return Ok(false);
        }
        Ok(stack.remove(layer))
    }

    /// Store `value` for `key` in the holder's own layer.
    ///
    /// The key must be declared by the holder's group. A simple value must
    /// fit the declared type, and a reference (with every value along its
    /// fallback chain) must target a property whose type the key accepts.
    /// On error nothing is stored.
    pub fn set(
        &self,
        id: HolderId,
        key: &PropertyKey,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>, PropertyError> {
        let (group, own) = self.with_holder(id, |data| (data.group.clone(), data.own.clone()))?;
        let decl = group
            .decl(key)
            .ok_or_else(|| PropertyError::unknown_property(key.name(), group.name()))?;
        check_assignable(decl, &value)?;
        Ok(own.set(key.clone(), value))
    }

    /// Store a simple value for `key`.
    pub fn set_value(
        &self,
        id: HolderId,
        key: &PropertyKey,
        value: impl Into<Value>,
    ) -> Result<Option<PropertyValue>, PropertyError> {
        self.set(id, key, PropertyValue::Simple(value.into()))
    }

    /// Remove the holder's own value for `key`, uncovering lower layers.
    pub fn unset(&self, id: HolderId, key: &PropertyKey) -> Result<Option<PropertyValue>, PropertyError> {
        Ok(self.own_layer(id)?.remove(key))
    }

    /// The effective, unresolved value of `key`.
    pub fn effective(&self, id: HolderId, key: &PropertyKey) -> Result<Option<PropertyValue>, PropertyError> {
        Ok(self.stack(id)?.effective(key))
    }

    /// The holder's own value for `key`, ignoring overlays and defaults.
    pub fn get_local(&self, id: HolderId, key: &PropertyKey) -> Result<Option<PropertyValue>, PropertyError> {
        Ok(self.own_layer(id)?.get(key))
    }

    /// The resolved value of `key`, following references and their
    /// fallback chains.
    pub fn get(&self, id: HolderId, key: &PropertyKey) -> Result<Option<Value>, PropertyError> {
        let stack = self.stack(id)?;
        Ok(stack
            .effective(key)
            .and_then(|value| value.get_with_default_at(self, id, 0)))
    }

    pub(crate) fn resolve_at(&self, id: HolderId, key: &PropertyKey, depth: usize) -> Option<Value> {
        let stack = self.stack(id).ok()?;
        stack
            .effective(key)
            .and_then(|value| value.get_with_default_at(self, id, depth))
    }

    fn resolve(&self, id: HolderId, key: &PropertyKey) -> Option<Value> {
        self.resolve_at(id, key, 0)
    }

    /// Replace an inherited reference with a local one that falls back to it.
    ///
    /// Returns `false` when the effective value is not a reference whose
    /// target resolves from this holder.
    pub fn override_with_sub_value(&self, id: HolderId, key: &PropertyKey) -> Result<bool, PropertyError> {
        let Some(current) = self.effective(id, key)? else {
            return Ok(false);
        };
        match current.make_sub_value(self, id) {
            Some(sub) => {
                self.set(id, key, sub)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// The bus carrying resolved value changes of a holder.
    pub fn changes(&self, id: HolderId) -> Result<Arc<SignalBus<HolderEvent>>, PropertyError> {
        self.with_holder(id, |data| data.signal.clone())
    }

    /// Subscribe to resolved value changes. Dropping the handle unsubscribes.
    pub fn subscribe<F>(&self, id: HolderId, listener: F) -> Result<Subscription<HolderEvent>, PropertyError>
    where
        F: Fn(&HolderEvent) + Send + Sync + 'static,
    {
        Ok(self.changes(id)?.subscribe_scoped(listener))
    }

    /// Subscribe without keeping `listener` alive.
    pub fn subscribe_weak<L>(&self, id: HolderId, listener: &Arc<L>) -> Result<SubscriptionId, PropertyError>
    where
        L: Listener<HolderEvent> + 'static,
    {
        Ok(self.changes(id)?.subscribe_weak(listener))
    }

    pub fn unsubscribe(&self, id: HolderId, subscription: SubscriptionId) -> Result<bool, PropertyError> {
        Ok(self.changes(id)?.unsubscribe(subscription))
    }

    /// Whether the holder currently has subscribers and follows its
    /// references.
    pub fn is_observed(&self, id: HolderId) -> bool {
        self.with_holder(id, |data| data.observation.clone())
            .map(|observation| observation.lock().stack.is_some())
            .unwrap_or(false)
    }

    fn activate(&self, id: HolderId) {
        let Ok((stack, observation)) = self.with_holder(id, |data| (data.stack.clone(), data.observation.clone())) else {
            return;
        };
        let tree = self.downgrade();
        let subscription = stack.changes().subscribe_scoped(move |event: &StackEvent| {
            if let Some(tree) = Self::upgrade(&tree) {
                tree.on_stack_changed(id, event);
            }
        });
        let previous = observation.lock().stack.replace(subscription);
        drop(previous);

        tracing::trace!(target: "lattice_props::holder", ?id, "holder observed");
        // Initial binding reports nothing; subscribers start from here.
        self.relink(id);
    }

    fn deactivate(&self, id: HolderId) {
        let Ok(observation) = self.with_holder(id, |data| data.observation.clone()) else {
            return;
        };
        let released = {
            let mut observation = observation.lock();
            (observation.stack.take(), std::mem::take(&mut observation.links))
        };
        tracing::trace!(target: "lattice_props::holder", ?id, links = released.1.len(), "holder no longer observed");
        drop(released);
    }

    fn observation(&self, id: HolderId) -> Option<Arc<Mutex<Observation>>> {
        self.with_holder(id, |data| data.observation.clone()).ok()
    }

    fn on_stack_changed(&self, id: HolderId, event: &StackEvent) {
        let Some(observation) = self.observation(id) else {
            return;
        };

        // Linked keys report their last resolved value; the rest resolve
        // whatever the stack reported as the old value.
        let cached: HashMap<PropertyKey, Option<Value>> = {
            let observation = observation.lock();
            event
                .keys()
                .filter_map(|key| {
                    observation
                        .links
                        .get(key)
                        .map(|link| (key.clone(), link.resolved.clone()))
                })
                .collect()
        };
        let rebound = self.relink(id);

        let mut out = HolderEvent::new();
        for (key, change) in event.iter() {
            let old = match cached.get(key) {
                Some(old) => old.clone(),
                None => change
                    .old
                    .as_ref()
                    .and_then(|value| value.get_with_default(self, id)),
            };
            out.record(key.clone(), old, self.resolve(id, key));
        }
        for (key, old, new) in rebound {
            if !event.contains(&key) {
                out.record(key, old, new);
            }
        }
        self.finish(id, out);
    }

    fn on_link_changed(&self, id: HolderId, key: &PropertyKey, source: HolderId, event: &HolderEvent) {
        let Some(observation) = self.observation(id) else {
            return;
        };
        let relevant = observation.lock().links.get(key).is_some_and(|link| {
            link.watches
                .iter()
                .any(|(holder, watched)| *holder == source && event.contains(watched))
        });
        if !relevant {
            return;
        }

        let mut out = HolderEvent::new();
        for (key, old, new) in self.relink(id) {
            out.record(key, old, new);
        }
        self.finish(id, out);
    }

    /// Settle links that depend on the holder's own values, then emit.
    fn finish(&self, id: HolderId, mut out: HolderEvent) {
        // Each pass can only move values that depend on the previous one,
        // so a chain settles within the resolution depth.
        for _ in 0..MAX_RESOLVE_DEPTH {
            let changed = self.relink(id);
            if changed.is_empty() {
                break;
            }
            for (key, old, new) in changed {
                out.record(key, old, new);
            }
        }

        if out.is_empty() {
            return;
        }
        if let Ok(signal) = self.changes(id) {
            tracing::trace!(target: "lattice_props::holder", ?id, changed = out.len(), "holder changed");
            signal.emit(&out);
        }
    }

    fn relink_holders(&self, ids: Vec<HolderId>) {
        for id in ids {
            let mut out = HolderEvent::new();
            for (key, old, new) in self.relink(id) {
                out.record(key, old, new);
            }
            self.finish(id, out);
        }
    }

    /// Bring the holder's links in line with its stack and the values its
    /// references read.
    ///
    /// Links whose dependencies moved are re-subscribed. Returns
    /// `(key, previous value, new value)` for every existing link whose
    /// resolved value changed. Does nothing unless the holder is observed.
    fn relink(&self, id: HolderId) -> Vec<(PropertyKey, Option<Value>, Option<Value>)> {
        let Ok((stack, observation)) = self.with_holder(id, |data| (data.stack.clone(), data.observation.clone())) else {
            return Vec::new();
        };
        if observation.lock().stack.is_none() {
            return Vec::new();
        }

        let wanted: Vec<(PropertyKey, PropertyValue, Vec<(HolderId, PropertyKey)>)> = stack
            .keys()
            .into_iter()
            .filter_map(|key| match stack.effective(&key) {
                Some(value @ PropertyValue::Reference(_)) => {
                    let watches = self.dependencies(id, &value);
                    Some((key, value, watches))
                }
                _ => None,
            })
            .collect();

        let (released, rebinding, kept) = {
            let mut observation = observation.lock();
            let wanted_keys: HashSet<&PropertyKey> = wanted.iter().map(|(key, ..)| key).collect();
            let mut released: Vec<ReferenceLink> = Vec::new();

            let gone: Vec<PropertyKey> = observation
                .links
                .keys()
                .filter(|key| !wanted_keys.contains(key))
                .cloned()
                .collect();
            for key in gone {
                released.extend(observation.links.remove(&key));
            }

            let mut rebinding = Vec::new();
            let mut kept = Vec::new();
            for (key, value, watches) in wanted {
                let unchanged = observation
                    .links
                    .get(&key)
                    .is_some_and(|link| link.value == value && link.watches == watches);
                if unchanged {
                    kept.push(key);
                    continue;
                }
                let previous = observation.links.remove(&key);
                let previous_resolved = previous.as_ref().map(|link| link.resolved.clone());
                released.extend(previous);
                rebinding.push((key, value, watches, previous_resolved));
            }
            (released, rebinding, kept)
        };

        let mut changed = Vec::new();
        for (key, value, watches, previous_resolved) in rebinding {
            let mut sources: Vec<HolderId> = Vec::new();
            for (holder, _) in &watches {
                if *holder != id && !sources.contains(holder) {
                    sources.push(*holder);
                }
            }
            let subscriptions = sources
                .into_iter()
                .filter_map(|source| self.follow(id, &key, source))
                .collect();
            let resolved = self.resolve(id, &key);
            if let Some(old) = previous_resolved {
                if old != resolved {
                    changed.push((key.clone(), old, resolved.clone()));
                }
            }
            observation.lock().links.insert(
                key,
                ReferenceLink {
                    value,
                    watches,
                    resolved,
                    subscriptions,
                },
            );
        }
        // Released after the new subscriptions so holders followed by both
        // stay observed.
        drop(released);

        for key in kept {
            let resolved = self.resolve(id, &key);
            let old = match observation.lock().links.get_mut(&key) {
                Some(link) if link.resolved != resolved => std::mem::replace(&mut link.resolved, resolved.clone()),
                _ => continue,
            };
            changed.push((key, old, resolved));
        }
        changed
    }

    /// Every `(holder, property)` that `value` reads when resolved from `id`.
    fn dependencies(&self, id: HolderId, value: &PropertyValue) -> Vec<(HolderId, PropertyKey)> {
        let mut watches = Vec::new();
        let mut current = value.as_reference();
        while let Some(reference) = current {
            if let Some(target) = reference.address().resolve_watching(self, id, &mut watches) {
                let read = (target, reference.target().clone());
                if !watches.contains(&read) {
                    watches.push(read);
                }
            }
            current = reference.parent().and_then(PropertyValue::as_reference);
        }
        watches
    }

    fn follow(&self, id: HolderId, key: &PropertyKey, source: HolderId) -> Option<Subscription<HolderEvent>> {
        let signal = self.changes(source).ok()?;
        let tree = self.downgrade();
        let key = key.clone();
        Some(signal.subscribe_scoped(move |event: &HolderEvent| {
            if let Some(tree) = Self::upgrade(&tree) {
                tree.on_link_changed(id, &key, source, event);
            }
        }))
    }
}

fn check_assignable(decl: &PropertyDecl, value: &PropertyValue) -> Result<(), PropertyError> {
    match value {
        PropertyValue::Simple(value) => {
            if !decl.value_type().accepts(value) {
                return Err(PropertyError::TypeMismatch {
                    name: decl.name().to_string(),
                    expected: decl.value_type(),
                    found: value.value_type(),
                });
            }
        }
        PropertyValue::Reference(reference) => {
            if !decl.value_type().is_assignable_from(reference.value_type()) {
                return Err(PropertyError::IncompatibleReferenceType {
                    referencing: decl.name().to_string(),
                    expected: decl.value_type(),
                    referenced: reference.target().name().to_string(),
                    found: reference.value_type(),
                });
            }
            if let Some(parent) = reference.parent() {
                check_assignable(decl, parent)?;
            }
        }
    }
    Ok(())
}

fn collect_descendants(
    holders: &SlotMap<HolderId, HolderData>,
    id: HolderId,
    result: &mut Vec<HolderId>,
) -> Result<(), PropertyError> {
    let data = holders.get(id).ok_or(PropertyError::InvalidHolder)?;
    for &child in &data.children {
        collect_descendants(holders, child, result)?;
        result.push(child);
    }
    Ok(())
}

/// Whether `potential_ancestor` is `id` or one of its ancestors.
fn is_ancestor_of(holders: &SlotMap<HolderId, HolderData>, potential_ancestor: HolderId, id: HolderId) -> bool {
    let mut current = Some(id);
    while let Some(current_id) = current {
        if current_id == potential_ancestor {
            return true;
        }
        current = holders.get(current_id).and_then(|data| data.parent);
    }
    false
}

impl fmt::Debug for HolderTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HolderTree")
            .field("holders", &self.shared.holders.read().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(HolderTree: Send, Sync);
