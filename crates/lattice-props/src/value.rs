//! Concrete property payloads.
//!
//! [`Value`] is the closed set of payloads a property can hold, and
//! [`ValueType`] is the declared type a property group attaches to each
//! property. Assignability between declared types is what reference
//! construction checks.

use std::fmt;

use crate::holder::HolderId;

/// A concrete property payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A boolean flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A text string.
    Text(String),
    /// A packed `0xRRGGBBAA` color.
    Color(u32),
    /// Another holder in the same tree, stored as a handle.
    Object(HolderId),
}

impl Value {
    /// The type of this payload.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Text(_) => ValueType::Text,
            Self::Color(_) => ValueType::Color,
            Self::Object(_) => ValueType::Object,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Read as a float, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<u32> {
        match self {
            Self::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<HolderId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<HolderId> for Value {
    fn from(value: HolderId) -> Self {
        Self::Object(value)
    }
}

/// The declared type of a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Accepts any payload.
    Any,
    Bool,
    Int,
    Float,
    Text,
    Color,
    Object,
}

impl ValueType {
    /// Whether a property of type `other` may feed a property of this type.
    ///
    /// Types are assignable to themselves, `Any` accepts everything and
    /// `Float` accepts `Int`.
    pub fn is_assignable_from(self, other: ValueType) -> bool {
        self == other || self == Self::Any || (self == Self::Float && other == Self::Int)
    }

    /// Whether `value` can be stored in a property of this type.
    pub fn accepts(self, value: &Value) -> bool {
        self.is_assignable_from(value.value_type())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Color => "color",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}
