//! Error types for lattice-props.

use crate::value::ValueType;

/// A specialized Result type for lattice-props operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for lattice-props operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Property model or holder tree error.
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    /// Binary encoding error.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Errors raised by the property model and the holder tree.
///
/// These are programming errors: wiring a reference between incompatible
/// types, addressing a holder that was destroyed, or indexing past the end
/// of a stack. An unresolvable reference is never an error; it reads as
/// `None`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// A reference was constructed between properties whose declared types
    /// are not assignable.
    #[error(
        "Property '{referencing}' ({expected}) cannot reference '{referenced}' ({found})"
    )]
    IncompatibleReferenceType {
        referencing: String,
        expected: ValueType,
        referenced: String,
        found: ValueType,
    },

    /// The property is not declared by the holder's group.
    #[error("Property '{name}' is not declared by group '{group}'")]
    UnknownProperty { name: String, group: String },

    /// A group declares the same property name twice.
    #[error("Property '{name}' is declared more than once in group '{group}'")]
    DuplicateProperty { name: String, group: String },

    /// A simple value does not match the declared type.
    #[error("Value for property '{name}' has type {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        found: ValueType,
    },

    /// The holder ID is invalid or the holder has been destroyed.
    #[error("Invalid or destroyed holder ID")]
    InvalidHolder,

    /// Attempted to make a holder its own parent or ancestor.
    #[error("Cannot set a holder as its own parent or ancestor")]
    CircularParentage,

    /// A layer index was outside the stack.
    #[error("Layer index {index} out of range for a stack of {len} layers")]
    LayerIndexOutOfRange { index: usize, len: usize },
}

/// Errors raised while encoding or decoding property values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// An unknown tag was read; the stream is corrupt or from a newer format.
    #[error("Invalid {context} tag {tag}")]
    InvalidEncodingTag { context: &'static str, tag: u32 },

    /// The input ended in the middle of a value.
    #[error("Unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    /// A length-prefixed string was not valid UTF-8.
    #[error("Encoded string is not valid UTF-8")]
    InvalidUtf8,

    /// The value refers to state that cannot be written, such as a
    /// destroyed holder.
    #[error("Value cannot be encoded: {0}")]
    UnencodableValue(String),

    /// Nested holders or composite addresses exceed the supported depth.
    #[error("Encoded value nests deeper than {0} levels")]
    NestingTooDeep(usize),
}

impl PropertyError {
    /// Create an unknown-property error.
    pub fn unknown_property(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self::UnknownProperty {
            name: name.into(),
            group: group.into(),
        }
    }
}
