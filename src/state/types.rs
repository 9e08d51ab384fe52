//! Plugin state type definitions
//!
//! Two parallel value trees live here:
//! - [`PropertyValue`]: the loosely-typed property list a plugin hands out
//!   from its full-state accessor (may contain shapes we cannot persist)
//! - [`TypedValue`]: the closed, serializable tree the preset store keeps

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Property-list style value as produced by a plugin's state accessor
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Double(f64),
    Float(f32),
    Data(Vec<u8>),
    Array(Vec<PropertyValue>),
    Dictionary(BTreeMap<String, PropertyValue>),
    /// Not representable as a [`TypedValue`]
    Boolean(bool),
    /// Not representable as a [`TypedValue`]
    Date(SystemTime),
}

impl PropertyValue {
    /// Short name of the runtime shape, used in codec errors
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "string",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Double(_) => "double",
            PropertyValue::Float(_) => "float",
            PropertyValue::Data(_) => "data",
            PropertyValue::Array(_) => "array",
            PropertyValue::Dictionary(_) => "dictionary",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Date(_) => "date",
        }
    }
}

/// Untyped state snapshot of one plugin instance
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Closed tagged representation of one plugin state value
///
/// Serialized adjacently tagged: `{"type": "float", "value": 0.5}`. The tag
/// keeps single and double precision apart so a round trip through the
/// preset file never widens or narrows a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TypedValue {
    String(String),
    Integer(i64),
    Double(#[serde(with = "float_repr::double")] f64),
    Float(#[serde(with = "float_repr::single")] f32),
    Data(#[serde(with = "serde_bytes")] Vec<u8>),
    Array(Vec<TypedValue>),
    Dictionary(BTreeMap<String, TypedValue>),
}

impl TypedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TypedValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            TypedValue::Double(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            TypedValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            TypedValue::Data(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[TypedValue]> {
        match self {
            TypedValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&BTreeMap<String, TypedValue>> {
        match self {
            TypedValue::Dictionary(map) => Some(map),
            _ => None,
        }
    }

    /// Human-readable rendering for inspection in the shell
    ///
    /// Floats of both widths use 16 fractional digits. Display only: the
    /// preset file never goes through this text.
    pub fn display_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::String(s) => write!(f, "{:?}", s),
            TypedValue::Integer(n) => write!(f, "{}", n),
            TypedValue::Double(n) => write!(f, "{:.16}", n),
            TypedValue::Float(n) => write!(f, "{:.16}", n),
            TypedValue::Data(b) => write!(f, "<{}>", hex::encode(b)),
            TypedValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            TypedValue::Dictionary(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Typed state snapshot of one plugin instance
pub type StateMap = BTreeMap<String, TypedValue>;

/// Index-aligned snapshot across all live instances; `None` = instance
/// yielded no state
pub type StateCollection = Vec<Option<StateMap>>;

/// Float (de)serialization that survives JSON for non-finite values
///
/// JSON has no NaN or infinities, so those are written as the strings
/// `"NaN"`, `"Infinity"` and `"-Infinity"`.
mod float_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr<T> {
        Number(T),
        Special(String),
    }

    fn special_name(value: f64) -> Option<&'static str> {
        if value.is_nan() {
            Some("NaN")
        } else if value == f64::INFINITY {
            Some("Infinity")
        } else if value == f64::NEG_INFINITY {
            Some("-Infinity")
        } else {
            None
        }
    }

    fn parse_special(name: &str) -> Option<f64> {
        match name {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        }
    }

    pub mod double {
        use super::*;

        pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
            match special_name(*value) {
                Some(name) => serializer.serialize_str(name),
                None => serializer.serialize_f64(*value),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
            match Repr::<f64>::deserialize(deserializer)? {
                Repr::Number(value) => Ok(value),
                Repr::Special(name) => parse_special(&name)
                    .ok_or_else(|| D::Error::custom(format!("invalid double literal '{}'", name))),
            }
        }
    }

    pub mod single {
        use super::*;

        pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
            match special_name(*value as f64) {
                Some(name) => serializer.serialize_str(name),
                None => serializer.serialize_f32(*value),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
            match Repr::<f32>::deserialize(deserializer)? {
                Repr::Number(value) => Ok(value),
                Repr::Special(name) => parse_special(&name)
                    .map(|v| v as f32)
                    .ok_or_else(|| D::Error::custom(format!("invalid float literal '{}'", name))),
            }
        }
    }
}
