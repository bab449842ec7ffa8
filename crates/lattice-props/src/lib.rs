//! Layered, reactive property composition for lattice-props.
//!
//! This crate provides:
//!
//! - **Signal Bus**: Thread-safe publish/subscribe with strong and weak
//!   subscriptions, configurable delivery order and activation hooks
//! - **Weak Entry Set**: A compacting set of weakly-held objects
//! - **Layers and Stacks**: Ordered override layers whose effective values
//!   are reported as minimal change events
//! - **Holder Tree**: An arena of property holders with parent links,
//!   overlays, group defaults and references between properties
//! - **Codec**: A compact binary encoding of values and holders
//! - **Sweeper**: A background thread reclaiming dead weak subscriptions
//!
//! # Example
//!
//! ```
//! use lattice_props::{HolderEvent, HolderTree, Layer, PropertyGroup, PropertyValue, Value, ValueType};
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), lattice_props::Error> {
//! let group = PropertyGroup::builder("Button")
//!     .property_with_default("padding", ValueType::Int, 4)
//!     .build()?;
//! let padding = group.key("padding").unwrap();
//!
//! let tree = HolderTree::new();
//! let button = tree.create(group.clone());
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let _subscription = {
//!     let seen = seen.clone();
//!     tree.subscribe(button, move |event: &HolderEvent| {
//!         for (key, change) in event.iter() {
//!             seen.lock().push((key.name().to_string(), change.new.clone()));
//!         }
//!     })?
//! };
//!
//! // A theme overlay shared by any number of holders.
//! let theme = Layer::named("spacious");
//! theme.set(padding.clone(), PropertyValue::simple(12));
//! tree.add_overlay(button, theme.clone())?;
//!
//! assert_eq!(tree.get(button, &padding)?, Some(Value::Int(12)));
//! assert_eq!(*seen.lock(), vec![("padding".to_string(), Some(Value::Int(12)))]);
//! # Ok(())
//! # }
//! ```

pub mod codec;
mod error;
mod event;
mod holder;
mod layer;
pub mod logging;
mod property;
mod reference;
pub mod signal;
mod stack;
pub mod sweeper;
mod value;
pub mod weak_set;

pub use codec::{decode_holder, decode_value, encode_holder, encode_value};
pub use error::{CodecError, Error, PropertyError, Result};
pub use event::{Change, ChangeEvent, HolderEvent, StackEvent};
pub use holder::{HolderId, HolderTree};
pub use layer::Layer;
pub use logging::{HolderTreeDebug, TreeFormatOptions, TreeStyle};
pub use property::{GroupRegistry, PropertyDecl, PropertyGroup, PropertyGroupBuilder, PropertyKey};
pub use reference::{MAX_RESOLVE_DEPTH, PropertyValue, Reference, TargetAddress};
pub use signal::{DeliveryOrder, Listener, SignalBus, SignalConfig, Subscription, SubscriptionId};
pub use stack::MapStack;
pub use sweeper::{Sweep, Sweeper, SweeperBuilder, SweeperConfig};
pub use value::{Value, ValueType};
pub use weak_set::WeakEntrySet;
