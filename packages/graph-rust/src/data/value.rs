//! Runtime value type for node and edge attributes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An attribute value.
///
/// Values are serialized with MessagePack when persisted and convert to
/// and from JSON for the portable dump format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value (distinct from a missing attribute).
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer outside the `i64` range.
    Uint(u64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes. Ignored by full-text indexing.
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Ordered list of values.
    List(Vec<Value>),
    /// String-keyed mapping of values.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the string slice if this is a [`Value::Str`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean if this is a [`Value::Bool`].
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Converts to a JSON value for the portable dump format.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Uint(u) => serde_json::Value::from(*u),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Converts a JSON value into a [`Value`].
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(Value::Uint(u), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msgpack_round_trip_all_variants() {
        let mut map = BTreeMap::new();
        map.insert("inner".to_string(), Value::Int(-7));

        let variants = vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(-42),
            Value::Uint(u64::MAX),
            Value::Float(2.5),
            Value::Str("hello".to_string()),
            Value::Bytes(vec![0xDE, 0xAD]),
            Value::List(vec![Value::Int(1), Value::Str("two".to_string())]),
            Value::Map(map),
        ];

        for value in variants {
            let bytes = rmp_serde::to_vec(&value).expect("serialize");
            let decoded: Value = rmp_serde::from_slice(&bytes).expect("deserialize");
            assert_eq!(value, decoded);
        }
    }

    #[test]
    fn json_round_trip() {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::Str("Alice".to_string()));
        map.insert("age".to_string(), Value::Int(30));
        let value = Value::Map(map);

        let json = value.to_json();
        assert_eq!(Value::from_json(&json), value);
    }

    #[test]
    fn display_renders_strings_verbatim() {
        assert_eq!(Value::Str("plain text".to_string()).to_string(), "plain text");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn from_conversions() {
        assert_eq!(Value::from("s"), Value::Str("s".to_string()));
        assert_eq!(Value::from(1_i64), Value::Int(1));
        assert_eq!(Value::from(true), Value::Bool(true));
        // Small u64 values normalize to Int so comparisons are stable.
        assert_eq!(Value::from(7_u64), Value::Int(7));
        assert_eq!(Value::from(u64::MAX), Value::Uint(u64::MAX));
    }
}
