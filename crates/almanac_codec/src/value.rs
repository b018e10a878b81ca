//! Dynamic field value type.

use crate::error::{CodecError, CodecResult};
use std::collections::BTreeMap;
use std::fmt;

/// A dynamic field value stored inside a record.
///
/// Floats are intentionally not supported: values must compare and hash
/// exactly so they can be used both for equality matching and as index key
/// components.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (timestamps are stored as milliseconds).
    Integer(i64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Array of values.
    Array(Vec<Value>),
    /// Nested map keyed by text.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true if this is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an `Integer`.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text value, if this is `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the array elements, if this is an `Array`.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the map entries, if this is a `Map`.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Gets a value from a map by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "h'{}'", b.iter().map(|x| format!("{x:02x}")).collect::<String>()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

impl From<Value> for ciborium::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ciborium::Value::Null,
            Value::Bool(b) => ciborium::Value::Bool(b),
            Value::Integer(n) => ciborium::Value::Integer(n.into()),
            Value::Text(s) => ciborium::Value::Text(s),
            Value::Bytes(b) => ciborium::Value::Bytes(b),
            Value::Array(items) => {
                ciborium::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => ciborium::Value::Map(
                map.into_iter()
                    .map(|(k, v)| (ciborium::Value::Text(k), v.into()))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<ciborium::Value> for Value {
    type Error = CodecError;

    fn try_from(value: ciborium::Value) -> CodecResult<Self> {
        match value {
            ciborium::Value::Null => Ok(Value::Null),
            ciborium::Value::Bool(b) => Ok(Value::Bool(b)),
            ciborium::Value::Integer(n) => i64::try_from(n)
                .map(Value::Integer)
                .map_err(|_| CodecError::invalid_structure("integer out of i64 range")),
            ciborium::Value::Text(s) => Ok(Value::Text(s)),
            ciborium::Value::Bytes(b) => Ok(Value::Bytes(b)),
            ciborium::Value::Float(_) => Err(CodecError::FloatForbidden),
            ciborium::Value::Array(items) => items
                .into_iter()
                .map(Value::try_from)
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::Array),
            ciborium::Value::Map(entries) => {
                let mut map = BTreeMap::new();
                for (k, v) in entries {
                    let ciborium::Value::Text(key) = k else {
                        return Err(CodecError::invalid_structure("map keys must be text"));
                    };
                    map.insert(key, Value::try_from(v)?);
                }
                Ok(Value::Map(map))
            }
            ciborium::Value::Tag(tag, _) => Err(CodecError::invalid_structure(format!(
                "unsupported CBOR tag {tag}"
            ))),
            _ => Err(CodecError::invalid_structure("unsupported CBOR item")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(7).as_integer(), Some(7));
        assert_eq!(Value::from("x").as_text(), Some("x"));
        assert_eq!(Value::Integer(7).as_text(), None);
    }

    #[test]
    fn map_get() {
        let mut inner = BTreeMap::new();
        inner.insert("tz".to_string(), Value::from("UTC"));
        let value = Value::Map(inner);
        assert_eq!(value.get("tz"), Some(&Value::from("UTC")));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::Null.get("tz"), None);
    }

    #[test]
    fn from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::from("a"));
    }

    #[test]
    fn float_is_rejected() {
        let result = Value::try_from(ciborium::Value::Float(1.5));
        assert_eq!(result, Err(CodecError::FloatForbidden));
    }

    #[test]
    fn non_text_map_key_is_rejected() {
        let raw = ciborium::Value::Map(vec![(
            ciborium::Value::Integer(1.into()),
            ciborium::Value::Null,
        )]);
        assert!(matches!(
            Value::try_from(raw),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn display_is_readable() {
        let value = Value::Array(vec![Value::from(1), Value::from("a"), Value::Null]);
        assert_eq!(value.to_string(), "[1, \"a\", null]");
    }
}
