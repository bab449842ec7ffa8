//! Property values and reference addressing.
//!
//! A [`PropertyValue`] stored in a layer is either a concrete [`Value`] or a
//! [`Reference`] saying "whatever property `target` currently is on the
//! holder found at `address`". References are resolved on every read; nothing
//! about the target is cached.
//!
//! # Addressing
//!
//! A [`TargetAddress`] is resolved relative to the holder that stores the
//! reference:
//!
//! | Address                          | Resolves to                                 |
//! |----------------------------------|---------------------------------------------|
//! | `Parent`                         | the anchor's parent                         |
//! | `This`                           | the anchor itself                           |
//! | `PropertyObjectProperty(key)`    | the live holder stored at `key` on anchor   |
//! | `Composite([a, b, ..])`          | `a`, then `b` relative to that, and so on   |
//!
//! # Fallback Chains
//!
//! A reference may carry a `parent` value. [`PropertyValue::get`] never looks
//! at it; [`PropertyValue::get_with_default`] falls back to it whenever the
//! target yields nothing. [`PropertyValue::make_sub_value`] builds such a
//! chain when a holder overrides a property that is already a reference.

use crate::error::PropertyError;
use crate::holder::{HolderId, HolderTree};
use crate::property::{PropertyDecl, PropertyKey};
use crate::value::{Value, ValueType};

/// Nested reference hops allowed before resolution gives up.
pub const MAX_RESOLVE_DEPTH: usize = 32;

/// Where a reference looks for its target holder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetAddress {
    /// The anchor's parent holder.
    Parent,
    /// The anchor itself.
    This,
    /// The holder stored as an object value at this property of the anchor.
    PropertyObjectProperty(PropertyKey),
    /// Each step resolved relative to the previous one.
    Composite(Vec<TargetAddress>),
}

impl TargetAddress {
    /// Resolve this address relative to `anchor`.
    ///
    /// Returns `None` when `anchor` is not alive or any step has no target.
    pub fn resolve(&self, tree: &HolderTree, anchor: HolderId) -> Option<HolderId> {
        self.resolve_at(tree, anchor, 0)
    }

    pub(crate) fn resolve_at(&self, tree: &HolderTree, anchor: HolderId, depth: usize) -> Option<HolderId> {
        if !tree.contains(anchor) {
            return None;
        }
        match self {
            Self::Parent => tree.parent(anchor).ok().flatten(),
            Self::This => Some(anchor),
            Self::PropertyObjectProperty(key) => match tree.resolve_at(anchor, key, depth + 1)? {
                Value::Object(id) if tree.contains(id) => Some(id),
                _ => None,
            },
            Self::Composite(steps) => steps
                .iter()
                .try_fold(anchor, |at, step| step.resolve_at(tree, at, depth)),
        }
    }

    /// Resolve like [`resolve`](Self::resolve), recording every
    /// `(holder, object property)` read on the way.
    pub(crate) fn resolve_watching(
        &self,
        tree: &HolderTree,
        anchor: HolderId,
        watches: &mut Vec<(HolderId, PropertyKey)>,
    ) -> Option<HolderId> {
        if !tree.contains(anchor) {
            return None;
        }
        match self {
            Self::Parent => tree.parent(anchor).ok().flatten(),
            Self::This => Some(anchor),
            Self::PropertyObjectProperty(key) => {
                let read = (anchor, key.clone());
                if !watches.contains(&read) {
                    watches.push(read);
                }
                match tree.resolve_at(anchor, key, 1)? {
                    Value::Object(id) if tree.contains(id) => Some(id),
                    _ => None,
                }
            }
            Self::Composite(steps) => steps
                .iter()
                .try_fold(anchor, |at, step| step.resolve_watching(tree, at, watches)),
        }
    }
}

/// A value defined as "equal to another property".
#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    address: TargetAddress,
    target: PropertyKey,
    /// Declared type of the target property.
    value_type: ValueType,
    parent: Option<Box<PropertyValue>>,
}

impl Reference {
    pub fn address(&self) -> &TargetAddress {
        &self.address
    }

    /// The referenced property.
    pub fn target(&self) -> &PropertyKey {
        &self.target
    }

    /// The declared type of the referenced property.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// The value to fall back to when the target yields nothing.
    pub fn parent(&self) -> Option<&PropertyValue> {
        self.parent.as_deref()
    }
}

/// What a layer stores for one property.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Simple(Value),
    Reference(Reference),
}

impl PropertyValue {
    pub fn simple(value: impl Into<Value>) -> Self {
        Self::Simple(value.into())
    }

    /// Build a reference from `declaring` to `target` found at `address`.
    ///
    /// Fails with [`PropertyError::IncompatibleReferenceType`] when values of
    /// the target's type cannot be stored in the declaring property.
    pub fn reference(
        declaring: &PropertyDecl,
        address: TargetAddress,
        target: &PropertyDecl,
    ) -> Result<Self, PropertyError> {
        Self::build_reference(declaring, address, target, None)
    }

    /// Like [`reference`](Self::reference), falling back to `parent`.
    pub fn reference_with_parent(
        declaring: &PropertyDecl,
        address: TargetAddress,
        target: &PropertyDecl,
        parent: PropertyValue,
    ) -> Result<Self, PropertyError> {
        Self::build_reference(declaring, address, target, Some(parent))
    }

    fn build_reference(
        declaring: &PropertyDecl,
        address: TargetAddress,
        target: &PropertyDecl,
        parent: Option<PropertyValue>,
    ) -> Result<Self, PropertyError> {
        if !declaring.value_type().is_assignable_from(target.value_type()) {
            return Err(PropertyError::IncompatibleReferenceType {
                referencing: declaring.name().to_string(),
                expected: declaring.value_type(),
                referenced: target.name().to_string(),
                found: target.value_type(),
            });
        }
        Ok(Self::Reference(Reference {
            address,
            target: target.key().clone(),
            value_type: target.value_type(),
            parent: parent.map(Box::new),
        }))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Reference(reference) => Some(reference),
            Self::Simple(_) => None,
        }
    }

    /// The value as seen from `holder`, ignoring any fallback chain.
    pub fn get(&self, tree: &HolderTree, holder: HolderId) -> Option<Value> {
        self.get_at(tree, holder, 0)
    }

    /// The value as seen from `holder`, falling back through the chain of
    /// parent values until one yields something.
    pub fn get_with_default(&self, tree: &HolderTree, holder: HolderId) -> Option<Value> {
        self.get_with_default_at(tree, holder, 0)
    }

    pub(crate) fn get_at(&self, tree: &HolderTree, holder: HolderId, depth: usize) -> Option<Value> {
        match self {
            Self::Simple(value) => Some(value.clone()),
            Self::Reference(reference) => {
                if depth >= MAX_RESOLVE_DEPTH {
                    tracing::warn!(
                        target: "lattice_props::holder",
                        property = %reference.target,
                        depth,
                        "reference chain too deep, treating as unresolved"
                    );
                    return None;
                }
                let target = reference.address.resolve_at(tree, holder, depth)?;
                tree.resolve_at(target, &reference.target, depth + 1)
            }
        }
    }

    pub(crate) fn get_with_default_at(&self, tree: &HolderTree, holder: HolderId, depth: usize) -> Option<Value> {
        self.get_at(tree, holder, depth).or_else(|| match self {
            Self::Reference(Reference {
                parent: Some(parent),
                ..
            }) => parent.get_with_default_at(tree, holder, depth),
            _ => None,
        })
    }

    /// A new reference to the same target whose fallback is `self`.
    ///
    /// Returns `None` for simple values, when the target holder does not
    /// resolve from `holder`, or when its group does not declare the target.
    pub fn make_sub_value(&self, tree: &HolderTree, holder: HolderId) -> Option<PropertyValue> {
        let reference = self.as_reference()?;
        let target = reference.address.resolve(tree, holder)?;
        if !tree.group(target).ok()?.declares(&reference.target) {
            return None;
        }
        Some(Self::Reference(Reference {
            address: reference.address.clone(),
            target: reference.target.clone(),
            value_type: reference.value_type,
            parent: Some(Box::new(self.clone())),
        }))
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        Self::Simple(value)
    }
}
