//! Publish/subscribe primitive for lattice-props.
//!
//! A [`SignalBus<T>`] delivers a payload to every subscribed [`Listener`].
//! Subscriptions are either strong (the bus keeps the listener alive) or weak
//! (the bus only observes the listener and forgets it once it is dropped).
//!
//! # Key Types
//!
//! - [`SignalBus<T>`] - The bus itself
//! - [`SubscriptionId`] - Returned by every subscribe call
//! - [`Subscription`] - RAII handle that unsubscribes when dropped
//! - [`DeliveryOrder`] - Insertion or reverse-insertion delivery
//!
//! # Emission
//!
//! [`SignalBus::emit`] snapshots the live subscribers under the registry
//! lock, releases the lock and then delivers. Listeners added or removed
//! while an emission is running are respected from the next emission on, and
//! a listener may safely subscribe, unsubscribe or emit from inside its own
//! callback.
//!
//! # Weak Subscriptions
//!
//! Dead weak subscriptions are pruned by [`SignalBus::sweep`]. A sweep runs
//! on demand from `emit`, `has_subscribers` and the subscribe calls, and a
//! [`crate::sweeper::Sweeper`] can run it periodically in the background.
//! Pruning the last subscriber counts as a transition to empty and fires the
//! `on_last_unsubscribed` hook.
//!
//! # Example
//!
//! ```
//! use lattice_props::signal::{DeliveryOrder, SignalBus, SignalConfig};
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! let bus = SignalBus::<i32>::with_config(SignalConfig::reverse());
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! for tag in 1..=3 {
//!     let seen = seen.clone();
//!     bus.subscribe_strong(move |value: &i32| seen.lock().push((tag, *value)));
//! }
//!
//! bus.emit(&7);
//! assert_eq!(*seen.lock(), vec![(3, 7), (2, 7), (1, 7)]);
//! assert_eq!(bus.order(), DeliveryOrder::Reverse);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// A unique identifier for a subscription on one bus.
    ///
    /// The ID stays valid until the subscription is removed through
    /// [`SignalBus::unsubscribe`] or, for weak subscriptions, until the
    /// listener is dropped and swept.
    pub struct SubscriptionId;
}

/// Something that can receive payloads from a [`SignalBus`].
///
/// Implemented for every `Fn(&T) + Send + Sync` closure.
pub trait Listener<T>: Send + Sync {
    /// Handle one emitted payload.
    fn notify(&self, payload: &T);
}

impl<T, F> Listener<T> for F
where
    F: Fn(&T) + Send + Sync,
{
    fn notify(&self, payload: &T) {
        self(payload)
    }
}

/// The order in which subscribers receive an emission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryOrder {
    /// First subscribed, first notified.
    #[default]
    Insertion,
    /// Last subscribed, first notified.
    Reverse,
}

/// Construction options for a [`SignalBus`].
#[derive(Clone, Debug, Default)]
pub struct SignalConfig {
    /// Delivery order, fixed for the lifetime of the bus.
    pub order: DeliveryOrder,
}

impl SignalConfig {
    /// Configuration for reverse-insertion delivery.
    pub fn reverse() -> Self {
        Self {
            order: DeliveryOrder::Reverse,
        }
    }
}

/// Internal storage for a single subscription.
enum Slot<T> {
    Strong(Arc<dyn Listener<T>>),
    Weak(Weak<dyn Listener<T>>),
}

impl<T> Slot<T> {
    fn upgrade(&self) -> Option<Arc<dyn Listener<T>>> {
        match self {
            Self::Strong(listener) => Some(listener.clone()),
            Self::Weak(listener) => listener.upgrade(),
        }
    }

    fn is_dead(&self) -> bool {
        match self {
            Self::Strong(_) => false,
            Self::Weak(listener) => listener.strong_count() == 0,
        }
    }

    fn address(&self) -> *const () {
        match self {
            Self::Strong(listener) => Arc::as_ptr(listener).cast::<()>(),
            Self::Weak(listener) => listener.as_ptr().cast::<()>(),
        }
    }
}

struct Registry<T> {
    slots: SlotMap<SubscriptionId, Slot<T>>,
    /// Subscription order; slotmap iteration order is not insertion order.
    order: Vec<SubscriptionId>,
    /// Whether the `on_first_subscriber` hook has fired without a matching
    /// `on_last_unsubscribed`.
    active: bool,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            order: Vec::new(),
            active: false,
        }
    }

    fn insert(&mut self, slot: Slot<T>) -> SubscriptionId {
        let id = self.slots.insert(slot);
        self.order.push(id);
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        if self.slots.remove(id).is_some() {
            self.order.retain(|&other| other != id);
            true
        } else {
            false
        }
    }

    fn prune(&mut self) -> usize {
        let dead: Vec<SubscriptionId> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.is_dead())
            .map(|(id, _)| id)
            .collect();
        for id in &dead {
            self.remove(*id);
        }
        dead.len()
    }

    /// Marks the registry inactive if it just became empty.
    fn take_idle_transition(&mut self) -> bool {
        if self.active && self.slots.is_empty() {
            self.active = false;
            true
        } else {
            false
        }
    }

    /// Marks the registry active if it just gained its first subscriber.
    fn take_active_transition(&mut self) -> bool {
        if !self.active && !self.slots.is_empty() {
            self.active = true;
            true
        } else {
            false
        }
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Hooks {
    on_first: Option<Hook>,
    on_last: Option<Hook>,
}

/// A thread-safe publish/subscribe bus.
///
/// # Type Parameter
///
/// - `T`: The payload type, passed to listeners by reference.
///
/// # Thread Safety
///
/// `SignalBus<T>` is `Send + Sync`. `emit`, the subscribe calls, `unsubscribe`
/// and `sweep` may be called concurrently from different threads. Transitions
/// between "no subscribers" and "has subscribers" are serialized by a
/// reentrant lock, so the activation hooks fire exactly once per transition
/// and may themselves subscribe to other buses.
pub struct SignalBus<T> {
    registry: Mutex<Registry<T>>,
    /// Serializes registry transitions together with their hook calls.
    transition: ReentrantMutex<()>,
    hooks: RwLock<Hooks>,
    order: DeliveryOrder,
    blocked: AtomicBool,
}

impl<T: 'static> Default for SignalBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> SignalBus<T> {
    /// Create a bus with insertion-order delivery.
    pub fn new() -> Self {
        Self::with_config(SignalConfig::default())
    }

    /// Create a bus with the given configuration.
    pub fn with_config(config: SignalConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            transition: ReentrantMutex::new(()),
            hooks: RwLock::new(Hooks::default()),
            order: config.order,
            blocked: AtomicBool::new(false),
        }
    }

    /// The delivery order chosen at construction.
    pub fn order(&self) -> DeliveryOrder {
        self.order
    }

    /// Install the activation hooks.
    ///
    /// `on_first` runs when the bus gains its first subscriber, `on_last`
    /// when it loses its last one (by unsubscribe or by sweeping a dead weak
    /// subscription). Installing hooks replaces any previous ones.
    pub fn set_activation_hooks<F, G>(&self, on_first: F, on_last: G)
    where
        F: Fn() + Send + Sync + 'static,
        G: Fn() + Send + Sync + 'static,
    {
        let mut hooks = self.hooks.write();
        hooks.on_first = Some(Arc::new(on_first));
        hooks.on_last = Some(Arc::new(on_last));
    }

    /// Subscribe a listener that the bus keeps alive.
    pub fn subscribe_strong<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.insert(Slot::Strong(Arc::new(listener)))
    }

    /// Subscribe a shared listener strongly.
    ///
    /// The same `Arc` can later be passed to
    /// [`unsubscribe_listener`](Self::unsubscribe_listener).
    pub fn subscribe_shared<L>(&self, listener: &Arc<L>) -> SubscriptionId
    where
        L: Listener<T> + 'static,
    {
        let listener: Arc<dyn Listener<T>> = listener.clone();
        self.insert(Slot::Strong(listener))
    }

    /// Subscribe a listener without keeping it alive.
    ///
    /// Once every strong reference to `listener` is dropped the subscription
    /// is never delivered to again, and the next sweep removes it.
    pub fn subscribe_weak<L>(&self, listener: &Arc<L>) -> SubscriptionId
    where
        L: Listener<T> + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn Listener<T>> = weak;
        self.insert(Slot::Weak(weak))
    }

    /// Subscribe a listener and return a handle that unsubscribes on drop.
    pub fn subscribe_scoped<F>(self: &Arc<Self>, listener: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.subscribe_strong(listener);
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn insert(&self, slot: Slot<T>) -> SubscriptionId {
        let _transition = self.transition.lock();
        let (id, activated) = {
            let mut registry = self.registry.lock();
            registry.prune();
            let id = registry.insert(slot);
            (id, registry.take_active_transition())
        };
        if activated {
            tracing::trace!(target: "lattice_props::signal", "first subscriber attached");
            self.run_hook(|hooks| hooks.on_first.clone());
        }
        id
    }

    /// Remove a subscription by ID.
    ///
    /// Returns `true` if the subscription was found and removed, `false`
    /// otherwise.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.remove_where(|registry| registry.remove(id))
    }

    /// Remove every subscription of `listener`, strong or weak.
    ///
    /// Returns `true` if at least one subscription was removed.
    pub fn unsubscribe_listener<L>(&self, listener: &Arc<L>) -> bool
    where
        L: Listener<T> + ?Sized + 'static,
    {
        let address = Arc::as_ptr(listener).cast::<()>();
        self.remove_where(|registry| {
            let matching: Vec<SubscriptionId> = registry
                .slots
                .iter()
                .filter(|(_, slot)| slot.address() == address)
                .map(|(id, _)| id)
                .collect();
            for id in &matching {
                registry.remove(*id);
            }
            !matching.is_empty()
        })
    }

    /// Remove every subscription.
    pub fn unsubscribe_all(&self) {
        self.remove_where(|registry| {
            let had_any = !registry.slots.is_empty();
            registry.slots.clear();
            registry.order.clear();
            had_any
        });
    }

    /// Prune dead weak subscriptions, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let mut pruned = 0;
        self.remove_where(|registry| {
            pruned = registry.prune();
            pruned > 0
        });
        if pruned > 0 {
            tracing::trace!(target: "lattice_props::signal", pruned, "swept dead subscriptions");
        }
        pruned
    }

    fn remove_where<F>(&self, remove: F) -> bool
    where
        F: FnOnce(&mut Registry<T>) -> bool,
    {
        let _transition = self.transition.lock();
        let (removed, idle) = {
            let mut registry = self.registry.lock();
            let removed = remove(&mut registry);
            registry.prune();
            (removed, registry.take_idle_transition())
        };
        if idle {
            tracing::trace!(target: "lattice_props::signal", "last subscriber detached");
            self.run_hook(|hooks| hooks.on_last.clone());
        }
        removed
    }

    fn run_hook<F>(&self, select: F)
    where
        F: FnOnce(&Hooks) -> Option<Hook>,
    {
        let hook = select(&self.hooks.read());
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Whether at least one live subscriber remains.
    pub fn has_subscribers(&self) -> bool {
        self.sweep();
        !self.registry.lock().slots.is_empty()
    }

    /// Number of subscriptions, including weak ones not swept yet.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().slots.len()
    }

    /// Block emission temporarily.
    ///
    /// While blocked, calls to `emit()` do nothing.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Deliver `payload` to a snapshot of the current subscribers.
    ///
    /// Returns the number of listeners invoked.
    #[tracing::instrument(skip_all, target = "lattice_props::signal", level = "trace")]
    pub fn emit(&self, payload: &T) -> usize {
        if self.is_blocked() {
            tracing::trace!(target: "lattice_props::signal", "bus blocked, skipping emit");
            return 0;
        }

        let (snapshot, saw_dead) = {
            let registry = self.registry.lock();
            let mut ids = registry.order.clone();
            if self.order == DeliveryOrder::Reverse {
                ids.reverse();
            }
            let mut saw_dead = false;
            let mut snapshot = Vec::with_capacity(ids.len());
            for id in ids {
                match registry.slots.get(id).and_then(Slot::upgrade) {
                    Some(listener) => snapshot.push(listener),
                    None => saw_dead = true,
                }
            }
            (snapshot, saw_dead)
        };

        if saw_dead {
            self.sweep();
        }

        tracing::trace!(target: "lattice_props::signal", listener_count = snapshot.len(), "emitting");
        for listener in &snapshot {
            listener.notify(payload);
        }
        snapshot.len()
    }
}

impl<T> fmt::Debug for SignalBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBus")
            .field("subscribers", &self.registry.lock().slots.len())
            .field("order", &self.order)
            .field("blocked", &self.blocked.load(Ordering::Relaxed))
            .finish()
    }
}

static_assertions::assert_impl_all!(SignalBus<()>: Send, Sync);

/// A subscription that is removed when dropped.
///
/// Created by [`SignalBus::subscribe_scoped`]. The handle only holds a weak
/// reference to its bus, so it never keeps the bus alive.
///
/// # Example
///
/// ```
/// use lattice_props::signal::SignalBus;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
///
/// let bus = Arc::new(SignalBus::<i32>::new());
/// let total = Arc::new(AtomicI32::new(0));
/// {
///     let total = total.clone();
///     let _subscription = bus.subscribe_scoped(move |n: &i32| {
///         total.fetch_add(*n, Ordering::SeqCst);
///     });
///     bus.emit(&42);
/// }
/// bus.emit(&43);
/// assert_eq!(total.load(Ordering::SeqCst), 42);
/// ```
pub struct Subscription<T: 'static> {
    bus: Weak<SignalBus<T>>,
    id: SubscriptionId,
}

impl<T: 'static> Subscription<T> {
    /// The underlying subscription ID.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the bus is still alive.
    pub fn is_attached(&self) -> bool {
        self.bus.strong_count() > 0
    }
}

impl<T: 'static> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

impl<T: 'static> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
