//! Property declarations.
//!
//! A [`PropertyGroup`] declares the properties a holder carries: a
//! [`PropertyKey`] per property, its [`ValueType`] and an optional default.
//! Keys compare by identity, so two groups that both declare `"color"` have
//! distinct keys.
//!
//! # Example
//!
//! ```
//! use lattice_props::{PropertyGroup, Value, ValueType};
//!
//! let group = PropertyGroup::builder("Button")
//!     .property("label", ValueType::Text)
//!     .property_with_default("enabled", ValueType::Bool, true)
//!     .build()
//!     .unwrap();
//!
//! let enabled = group.key("enabled").unwrap();
//! assert_eq!(group.decl(&enabled).unwrap().default(), Some(&Value::Bool(true)));
//! assert!(group.key("missing").is_none());
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::PropertyError;
use crate::layer::Layer;
use crate::reference::PropertyValue;
use crate::value::{Value, ValueType};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a declared property.
///
/// Equality, hashing and ordering use an id allocated at creation; the name
/// is carried for encoding and diagnostics only.
#[derive(Clone)]
pub struct PropertyKey {
    id: u64,
    name: Arc<str>,
}

impl PropertyKey {
    /// Allocate a new key. Every call yields a distinct key.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for PropertyKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PropertyKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One declared property.
#[derive(Clone, Debug)]
pub struct PropertyDecl {
    key: PropertyKey,
    value_type: ValueType,
    default: Option<Value>,
}

impl PropertyDecl {
    /// Declare a standalone property outside any group.
    pub fn new(name: impl Into<Arc<str>>, value_type: ValueType) -> Self {
        Self {
            key: PropertyKey::new(name),
            value_type,
            default: None,
        }
    }

    pub fn key(&self) -> &PropertyKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        self.key.name()
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

/// A named, immutable set of property declarations.
///
/// The group owns a defaults layer holding every declared default. Holders
/// of the group share it as the bottom layer of their stacks, so changing a
/// default there is observed by all of them.
pub struct PropertyGroup {
    name: String,
    decls: Vec<PropertyDecl>,
    by_key: HashMap<PropertyKey, usize>,
    by_name: HashMap<String, usize>,
    defaults: Arc<Layer>,
}

impl PropertyGroup {
    /// Start declaring a group.
    pub fn builder(name: impl Into<String>) -> PropertyGroupBuilder {
        PropertyGroupBuilder {
            name: name.into(),
            decls: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declaration for `key`, if this group declares it.
    pub fn decl(&self, key: &PropertyKey) -> Option<&PropertyDecl> {
        self.by_key.get(key).map(|&index| &self.decls[index])
    }

    /// The declaration named `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&PropertyDecl> {
        self.by_name.get(name).map(|&index| &self.decls[index])
    }

    /// The key of the property named `name`, if any.
    pub fn key(&self, name: &str) -> Option<PropertyKey> {
        self.lookup(name).map(|decl| decl.key.clone())
    }

    pub fn declares(&self, key: &PropertyKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Declarations in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &PropertyDecl> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// The shared layer holding declared defaults.
    pub fn defaults_layer(&self) -> &Arc<Layer> {
        &self.defaults
    }
}

impl fmt::Debug for PropertyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyGroup")
            .field("name", &self.name)
            .field(
                "properties",
                &self.decls.iter().map(PropertyDecl::name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder for [`PropertyGroup`].
#[derive(Debug)]
pub struct PropertyGroupBuilder {
    name: String,
    decls: Vec<(String, ValueType, Option<Value>)>,
}

impl PropertyGroupBuilder {
    /// Declare a property without a default.
    pub fn property(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.decls.push((name.into(), value_type, None));
        self
    }

    /// Declare a property with a default value.
    pub fn property_with_default(
        mut self,
        name: impl Into<String>,
        value_type: ValueType,
        default: impl Into<Value>,
    ) -> Self {
        self.decls
            .push((name.into(), value_type, Some(default.into())));
        self
    }

    /// Validate the declarations and build the group.
    pub fn build(self) -> Result<Arc<PropertyGroup>, PropertyError> {
        let defaults = Layer::named(format!("{} defaults", self.name));
        let mut decls = Vec::with_capacity(self.decls.len());
        let mut by_key = HashMap::new();
        let mut by_name = HashMap::new();

        for (name, value_type, default) in self.decls {
            if by_name.contains_key(&name) {
                return Err(PropertyError::DuplicateProperty {
                    name,
                    group: self.name,
                });
            }
            if let Some(value) = &default {
                if !value_type.accepts(value) {
                    return Err(PropertyError::TypeMismatch {
                        name,
                        expected: value_type,
                        found: value.value_type(),
                    });
                }
            }

            let decl = PropertyDecl {
                key: PropertyKey::new(name.as_str()),
                value_type,
                default,
            };
            if let Some(value) = &decl.default {
                defaults.set(decl.key.clone(), PropertyValue::Simple(value.clone()));
            }
            by_key.insert(decl.key.clone(), decls.len());
            by_name.insert(name, decls.len());
            decls.push(decl);
        }

        tracing::debug!(target: "lattice_props::holder", group = %self.name, properties = decls.len(), "declared property group");

        Ok(Arc::new(PropertyGroup {
            name: self.name,
            decls,
            by_key,
            by_name,
            defaults,
        }))
    }
}

/// Groups known to a decoder, looked up by name.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: HashMap<String, Arc<PropertyGroup>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group, replacing any group with the same name.
    pub fn register(&mut self, group: Arc<PropertyGroup>) {
        self.groups.insert(group.name().to_string(), group);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<PropertyGroup>> {
        self.groups.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_compare_by_identity() {
        let a = PropertyKey::new("color");
        let b = PropertyKey::new("color");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_group_lookup() {
        let group = PropertyGroup::builder("Label")
            .property("text", ValueType::Text)
            .property_with_default("size", ValueType::Float, 12.0)
            .build()
            .unwrap();

        let text = group.key("text").unwrap();
        assert!(group.declares(&text));
        assert_eq!(group.decl(&text).unwrap().value_type(), ValueType::Text);
        assert_eq!(group.len(), 2);

        let other = PropertyGroup::builder("Other")
            .property("text", ValueType::Text)
            .build()
            .unwrap();
        assert!(!group.declares(&other.key("text").unwrap()));
    }

    #[test]
    fn test_defaults_layer_holds_defaults() {
        let group = PropertyGroup::builder("Label")
            .property("text", ValueType::Text)
            .property_with_default("size", ValueType::Float, 12.0)
            .build()
            .unwrap();

        let size = group.key("size").unwrap();
        let text = group.key("text").unwrap();
        let defaults = group.defaults_layer();
        assert_eq!(defaults.get(&size), Some(PropertyValue::Simple(Value::Float(12.0))));
        assert_eq!(defaults.get(&text), None);
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let err = PropertyGroup::builder("Dup")
            .property("a", ValueType::Int)
            .property("a", ValueType::Int)
            .build()
            .unwrap_err();
        assert!(matches!(err, PropertyError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_default_type_checked() {
        let err = PropertyGroup::builder("Bad")
            .property_with_default("flag", ValueType::Bool, "yes")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            PropertyError::TypeMismatch {
                name: "flag".to_string(),
                expected: ValueType::Bool,
                found: ValueType::Text,
            }
        );
    }
}
