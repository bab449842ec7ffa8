//! Binary encoding of property values and holders.
//!
//! All integers are big-endian. Strings are a `u32` byte length followed by
//! UTF-8 bytes.
//!
//! ```text
//! value     = u32 kind (0 simple, 1 reference), then
//!             simple:    payload
//!             reference: address, target property name
//! payload   = u32 tag, then
//!             0 bool (u8) | 1 int (i64) | 2 float (f64 bits) | 3 text (string)
//!             4 color (u32) | 5 object (holder)
//! holder    = group name, u32 entry count, entries (property name, value)
//! address   = u32 tag, then
//!             0 parent | 1 this | 2 property object property (name)
//!             3 composite (u32 count, addresses)
//! ```
//!
//! Names, not keys, go on the wire, so decoding looks them up again. A
//! reference whose address or target name no longer exists decodes as
//! absent rather than failing, as does a nested holder of an unknown group.
//! The bytes are consumed either way, so the rest of the stream still loads.
//! An unknown tag is a hard [`CodecError::InvalidEncodingTag`].
//!
//! A reference's fallback chain is not encoded.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::holder::{HolderId, HolderTree};
use crate::property::{GroupRegistry, PropertyDecl};
use crate::reference::{PropertyValue, TargetAddress};
use crate::value::Value;

const KIND_SIMPLE: u32 = 0;
const KIND_REFERENCE: u32 = 1;

const PAYLOAD_BOOL: u32 = 0;
const PAYLOAD_INT: u32 = 1;
const PAYLOAD_FLOAT: u32 = 2;
const PAYLOAD_TEXT: u32 = 3;
const PAYLOAD_COLOR: u32 = 4;
const PAYLOAD_OBJECT: u32 = 5;

const ADDRESS_PARENT: u32 = 0;
const ADDRESS_THIS: u32 = 1;
const ADDRESS_PROPERTY_OBJECT: u32 = 2;
const ADDRESS_COMPOSITE: u32 = 3;

/// Deepest nesting of holders or composite addresses accepted.
pub const MAX_NESTING: usize = 64;

// =============================================================================
// Encoding
// =============================================================================

/// Encode one property value.
///
/// Object values are written as the full nested holder.
pub fn encode_value(tree: &HolderTree, value: &PropertyValue) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    Encoder::new(tree).value(&mut buf, value)?;
    Ok(buf.freeze())
}

/// Encode a holder's group name and own values.
///
/// Overlays and defaults are not part of a holder's encoding.
pub fn encode_holder(tree: &HolderTree, id: HolderId) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    Encoder::new(tree).holder(&mut buf, id)?;
    Ok(buf.freeze())
}

struct Encoder<'a> {
    tree: &'a HolderTree,
    /// Holders being written, to reject object cycles.
    visiting: Vec<HolderId>,
}

impl<'a> Encoder<'a> {
    fn new(tree: &'a HolderTree) -> Self {
        Self {
            tree,
            visiting: Vec::new(),
        }
    }

    fn value(&mut self, buf: &mut BytesMut, value: &PropertyValue) -> Result<()> {
        match value {
            PropertyValue::Simple(payload) => {
                buf.put_u32(KIND_SIMPLE);
                self.payload(buf, payload)
            }
            PropertyValue::Reference(reference) => {
                buf.put_u32(KIND_REFERENCE);
                write_address(buf, reference.address(), 0)?;
                write_str(buf, reference.target().name())
            }
        }
    }

    fn payload(&mut self, buf: &mut BytesMut, payload: &Value) -> Result<()> {
        match payload {
            Value::Bool(value) => {
                buf.put_u32(PAYLOAD_BOOL);
                buf.put_u8(u8::from(*value));
            }
            Value::Int(value) => {
                buf.put_u32(PAYLOAD_INT);
                buf.put_i64(*value);
            }
            Value::Float(value) => {
                buf.put_u32(PAYLOAD_FLOAT);
                buf.put_f64(*value);
            }
            Value::Text(value) => {
                buf.put_u32(PAYLOAD_TEXT);
                write_str(buf, value)?;
            }
            Value::Color(value) => {
                buf.put_u32(PAYLOAD_COLOR);
                buf.put_u32(*value);
            }
            Value::Object(id) => {
                buf.put_u32(PAYLOAD_OBJECT);
                self.holder(buf, *id)?;
            }
        }
        Ok(())
    }

    fn holder(&mut self, buf: &mut BytesMut, id: HolderId) -> Result<()> {
        if self.visiting.contains(&id) {
            return Err(CodecError::UnencodableValue(format!("holder {id:?} contains itself")).into());
        }
        if self.visiting.len() >= MAX_NESTING {
            return Err(CodecError::NestingTooDeep(MAX_NESTING).into());
        }
        let (group, own) = match (self.tree.group(id), self.tree.own_layer(id)) {
            (Ok(group), Ok(own)) => (group, own),
            _ => {
                return Err(CodecError::UnencodableValue(format!("holder {id:?} no longer exists")).into());
            }
        };

        // Simple values first: references may address object values of the
        // same holder, which must exist by the time they are decoded.
        let mut entries = own.entries();
        entries.sort_by_key(|(key, value)| (value.is_reference(), key.id()));

        write_str(buf, group.name())?;
        buf.put_u32(encoded_len(entries.len(), "entry count")?);
        self.visiting.push(id);
        for (key, value) in &entries {
            write_str(buf, key.name())?;
            self.value(buf, value)?;
        }
        self.visiting.pop();
        Ok(())
    }
}

fn write_address(buf: &mut BytesMut, address: &TargetAddress, depth: usize) -> Result<()> {
    if depth >= MAX_NESTING {
        return Err(CodecError::NestingTooDeep(MAX_NESTING).into());
    }
    match address {
        TargetAddress::Parent => buf.put_u32(ADDRESS_PARENT),
        TargetAddress::This => buf.put_u32(ADDRESS_THIS),
        TargetAddress::PropertyObjectProperty(key) => {
            buf.put_u32(ADDRESS_PROPERTY_OBJECT);
            write_str(buf, key.name())?;
        }
        TargetAddress::Composite(steps) => {
            buf.put_u32(ADDRESS_COMPOSITE);
            buf.put_u32(encoded_len(steps.len(), "composite length")?);
            for step in steps {
                write_address(buf, step, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn write_str(buf: &mut BytesMut, value: &str) -> Result<()> {
    buf.put_u32(encoded_len(value.len(), "string length")?);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn encoded_len(len: usize, context: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| CodecError::UnencodableValue(format!("{context} {len} does not fit in u32")).into())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one value of the property `declared`, stored on `anchor`.
///
/// References are resolved from `anchor` to look up their names, and nested
/// object holders are created as children of `anchor`. Returns `Ok(None)`
/// when the value no longer applies: a reference whose names do not
/// resolve, a reference or payload whose type does not fit `declared`, or a
/// nested holder of an unregistered group.
pub fn decode_value(
    tree: &HolderTree,
    groups: &GroupRegistry,
    anchor: HolderId,
    declared: &PropertyDecl,
    bytes: &[u8],
) -> Result<Option<PropertyValue>> {
    let mut buf = bytes;
    Decoder { tree, groups }.value(&mut buf, anchor, declared, 0)
}

/// Decode a holder, creating it under `parent` (or as a root).
///
/// Properties the group no longer declares are skipped. Returns `Ok(None)`
/// if the holder's group is not registered.
pub fn decode_holder(
    tree: &HolderTree,
    groups: &GroupRegistry,
    parent: Option<HolderId>,
    bytes: &[u8],
) -> Result<Option<HolderId>> {
    let mut buf = bytes;
    Decoder { tree, groups }.holder(&mut buf, parent, 0)
}

struct Decoder<'a> {
    tree: &'a HolderTree,
    groups: &'a GroupRegistry,
}

impl Decoder<'_> {
    fn value(
        &self,
        buf: &mut &[u8],
        anchor: HolderId,
        declared: &PropertyDecl,
        depth: usize,
    ) -> Result<Option<PropertyValue>> {
        match read_u32(buf, "property value")? {
            KIND_SIMPLE => {
                let Some(payload) = self.payload(buf, anchor, depth)? else {
                    return Ok(None);
                };
                if !declared.value_type().accepts(&payload) {
                    tracing::warn!(
                        target: "lattice_props::codec",
                        property = declared.name(),
                        expected = %declared.value_type(),
                        found = %payload.value_type(),
                        "dropping value of the wrong type"
                    );
                    return Ok(None);
                }
                Ok(Some(PropertyValue::Simple(payload)))
            }
            KIND_REFERENCE => {
                let (address, target) = self.address(buf, Some(anchor), 0)?;
                let name = read_string(buf, "reference target")?;
                let (Some(address), Some(target)) = (address, target) else {
                    tracing::debug!(target: "lattice_props::codec", property = declared.name(), "reference address no longer resolves");
                    return Ok(None);
                };
                let Some(target_decl) = self.tree.group(target)?.lookup(&name).cloned() else {
                    tracing::debug!(target: "lattice_props::codec", property = declared.name(), referenced = %name, "referenced property no longer exists");
                    return Ok(None);
                };
                match PropertyValue::reference(declared, address, &target_decl) {
                    Ok(value) => Ok(Some(value)),
                    Err(err) => {
                        tracing::warn!(target: "lattice_props::codec", %err, "dropping incompatible reference");
                        Ok(None)
                    }
                }
            }
            tag => Err(CodecError::InvalidEncodingTag {
                context: "property value",
                tag,
            }
            .into()),
        }
    }

    fn payload(&self, buf: &mut &[u8], anchor: HolderId, depth: usize) -> Result<Option<Value>> {
        let value = match read_u32(buf, "payload")? {
            PAYLOAD_BOOL => Value::Bool(read_u8(buf, "bool")? != 0),
            PAYLOAD_INT => Value::Int(read_i64(buf, "int")?),
            PAYLOAD_FLOAT => Value::Float(f64::from_bits(read_i64(buf, "float")? as u64)),
            PAYLOAD_TEXT => Value::Text(read_string(buf, "text")?),
            PAYLOAD_COLOR => Value::Color(read_u32(buf, "color")?),
            PAYLOAD_OBJECT => {
                return Ok(self.holder(buf, Some(anchor), depth + 1)?.map(Value::Object));
            }
            tag => {
                return Err(CodecError::InvalidEncodingTag { context: "payload", tag }.into());
            }
        };
        Ok(Some(value))
    }

    fn holder(&self, buf: &mut &[u8], parent: Option<HolderId>, depth: usize) -> Result<Option<HolderId>> {
        if depth >= MAX_NESTING {
            return Err(CodecError::NestingTooDeep(MAX_NESTING).into());
        }
        let group_name = read_string(buf, "group name")?;
        let count = read_u32(buf, "entry count")?;

        let Some(group) = self.groups.get(&group_name).cloned() else {
            tracing::debug!(target: "lattice_props::codec", group = %group_name, "skipping holder of unknown group");
            for _ in 0..count {
                read_string(buf, "property name")?;
                skip_value(buf, depth)?;
            }
            return Ok(None);
        };

        let id = match parent {
            Some(parent) => self.tree.create_child(group.clone(), parent)?,
            None => self.tree.create(group.clone()),
        };
        let loaded = (0..count).try_for_each(|_| -> Result<()> {
            let name = read_string(buf, "property name")?;
            match group.lookup(&name) {
                Some(decl) => {
                    if let Some(value) = self.value(buf, id, decl, depth)? {
                        self.tree.set(id, decl.key(), value)?;
                    }
                }
                None => {
                    tracing::debug!(target: "lattice_props::codec", group = %group_name, property = %name, "skipping undeclared property");
                    skip_value(buf, depth)?;
                }
            }
            Ok(())
        });

        match loaded {
            Ok(()) => Ok(Some(id)),
            Err(err) => {
                // A half-loaded holder is worse than none.
                if let Err(cleanup) = self.tree.destroy(id) {
                    tracing::warn!(target: "lattice_props::codec", ?id, %cleanup, "failed to discard partially decoded holder");
                }
                Err(err)
            }
        }
    }

    /// Read an address, resolving it step by step from `at`.
    ///
    /// Returns the address (if every name resolved) and the holder it
    /// resolves to.
    fn address(
        &self,
        buf: &mut &[u8],
        at: Option<HolderId>,
        depth: usize,
    ) -> Result<(Option<TargetAddress>, Option<HolderId>)> {
        if depth >= MAX_NESTING {
            return Err(CodecError::NestingTooDeep(MAX_NESTING).into());
        }
        let address = match read_u32(buf, "address")? {
            ADDRESS_PARENT => Some(TargetAddress::Parent),
            ADDRESS_THIS => Some(TargetAddress::This),
            ADDRESS_PROPERTY_OBJECT => {
                let name = read_string(buf, "address property")?;
                at.and_then(|holder| self.tree.group(holder).ok())
                    .and_then(|group| group.key(&name))
                    .map(TargetAddress::PropertyObjectProperty)
            }
            ADDRESS_COMPOSITE => {
                let count = read_u32(buf, "composite length")?;
                let mut steps = Some(Vec::new());
                let mut current = at;
                for _ in 0..count {
                    let (step, next) = self.address(buf, current, depth + 1)?;
                    current = next;
                    match (steps.as_mut(), step) {
                        (Some(steps), Some(step)) => steps.push(step),
                        _ => steps = None,
                    }
                }
                return Ok((steps.map(TargetAddress::Composite), current));
            }
            tag => {
                return Err(CodecError::InvalidEncodingTag { context: "address", tag }.into());
            }
        };
        let resolved = match (&address, at) {
            (Some(address), Some(at)) => address.resolve(self.tree, at),
            _ => None,
        };
        Ok((address, resolved))
    }
}

fn skip_value(buf: &mut &[u8], depth: usize) -> Result<()> {
    match read_u32(buf, "property value")? {
        KIND_SIMPLE => skip_payload(buf, depth),
        KIND_REFERENCE => {
            skip_address(buf, 0)?;
            read_string(buf, "reference target")?;
            Ok(())
        }
        tag => Err(CodecError::InvalidEncodingTag {
            context: "property value",
            tag,
        }
        .into()),
    }
}

fn skip_payload(buf: &mut &[u8], depth: usize) -> Result<()> {
    match read_u32(buf, "payload")? {
        PAYLOAD_BOOL => skip(buf, 1, "bool"),
        PAYLOAD_INT => skip(buf, 8, "int"),
        PAYLOAD_FLOAT => skip(buf, 8, "float"),
        PAYLOAD_TEXT => read_string(buf, "text").map(drop),
        PAYLOAD_COLOR => skip(buf, 4, "color"),
        PAYLOAD_OBJECT => {
            if depth + 1 >= MAX_NESTING {
                return Err(CodecError::NestingTooDeep(MAX_NESTING).into());
            }
            read_string(buf, "group name")?;
            for _ in 0..read_u32(buf, "entry count")? {
                read_string(buf, "property name")?;
                skip_value(buf, depth + 1)?;
            }
            Ok(())
        }
        tag => Err(CodecError::InvalidEncodingTag { context: "payload", tag }.into()),
    }
}

fn skip_address(buf: &mut &[u8], depth: usize) -> Result<()> {
    if depth >= MAX_NESTING {
        return Err(CodecError::NestingTooDeep(MAX_NESTING).into());
    }
    match read_u32(buf, "address")? {
        ADDRESS_PARENT | ADDRESS_THIS => Ok(()),
        ADDRESS_PROPERTY_OBJECT => read_string(buf, "address property").map(drop),
        ADDRESS_COMPOSITE => {
            for _ in 0..read_u32(buf, "composite length")? {
                skip_address(buf, depth + 1)?;
            }
            Ok(())
        }
        tag => Err(CodecError::InvalidEncodingTag { context: "address", tag }.into()),
    }
}

fn ensure(buf: &&[u8], len: usize, context: &'static str) -> std::result::Result<(), CodecError> {
    if buf.remaining() < len {
        Err(CodecError::UnexpectedEof { context })
    } else {
        Ok(())
    }
}

fn skip(buf: &mut &[u8], len: usize, context: &'static str) -> Result<()> {
    ensure(buf, len, context)?;
    buf.advance(len);
    Ok(())
}

fn read_u8(buf: &mut &[u8], context: &'static str) -> Result<u8> {
    ensure(buf, 1, context)?;
    Ok(buf.get_u8())
}

fn read_u32(buf: &mut &[u8], context: &'static str) -> Result<u32> {
    ensure(buf, 4, context)?;
    Ok(buf.get_u32())
}

fn read_i64(buf: &mut &[u8], context: &'static str) -> Result<i64> {
    ensure(buf, 8, context)?;
    Ok(buf.get_i64())
}

fn read_string(buf: &mut &[u8], context: &'static str) -> Result<String> {
    let len = read_u32(buf, context)? as usize;
    ensure(buf, len, context)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?)
}
