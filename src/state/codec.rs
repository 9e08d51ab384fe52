//! Conversion between plugin property lists and the typed state tree
//!
//! `encode` is all-or-nothing: the first unsupported shape anywhere in the
//! tree fails the whole conversion and no partial tree is returned.
//! `decode` is total.

use super::types::{PropertyMap, PropertyValue, StateMap, TypedValue};
use crate::error::CodecError;

/// Convert a property value into its typed representation
pub fn encode(value: &PropertyValue) -> Result<TypedValue, CodecError> {
    encode_at(value, &mut String::new())
}

/// Convert a typed value back into the property shape a plugin accepts
pub fn decode(value: &TypedValue) -> PropertyValue {
    match value {
        TypedValue::String(s) => PropertyValue::String(s.clone()),
        TypedValue::Integer(n) => PropertyValue::Integer(*n),
        TypedValue::Double(n) => PropertyValue::Double(*n),
        TypedValue::Float(n) => PropertyValue::Float(*n),
        TypedValue::Data(b) => PropertyValue::Data(b.clone()),
        TypedValue::Array(items) => PropertyValue::Array(items.iter().map(decode).collect()),
        TypedValue::Dictionary(map) => PropertyValue::Dictionary(
            map.iter().map(|(k, v)| (k.clone(), decode(v))).collect(),
        ),
    }
}

/// Encode a full instance snapshot
pub fn encode_state_map(map: &PropertyMap) -> Result<StateMap, CodecError> {
    let mut path = String::new();
    encode_entries(map, &mut path)
}

/// Decode a full instance snapshot
pub fn decode_state_map(map: &StateMap) -> PropertyMap {
    map.iter().map(|(k, v)| (k.clone(), decode(v))).collect()
}

/// `path` tracks the location in the tree for error reporting (`a.b[2]`)
fn encode_at(value: &PropertyValue, path: &mut String) -> Result<TypedValue, CodecError> {
    let typed = match value {
        PropertyValue::String(s) => TypedValue::String(s.clone()),
        PropertyValue::Integer(n) => TypedValue::Integer(*n),
        PropertyValue::Double(n) => TypedValue::Double(*n),
        PropertyValue::Float(n) => TypedValue::Float(*n),
        PropertyValue::Data(b) => TypedValue::Data(b.clone()),
        PropertyValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let len = path.len();
                path.push_str(&format!("[{}]", index));
                out.push(encode_at(item, path)?);
                path.truncate(len);
            }
            TypedValue::Array(out)
        }
        PropertyValue::Dictionary(map) => TypedValue::Dictionary(encode_entries(map, path)?),
        PropertyValue::Boolean(_) | PropertyValue::Date(_) => {
            return Err(CodecError::UnsupportedType {
                kind: value.kind(),
                path: if path.is_empty() {
                    "<root>".to_string()
                } else {
                    path.clone()
                },
            });
        }
    };
    Ok(typed)
}

fn encode_entries(map: &PropertyMap, path: &mut String) -> Result<StateMap, CodecError> {
    let mut out = StateMap::new();
    for (key, value) in map {
        let len = path.len();
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(key);
        out.insert(key.clone(), encode_at(value, path)?);
        path.truncate(len);
    }
    Ok(out)
}
