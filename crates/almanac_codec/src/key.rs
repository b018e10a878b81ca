//! Index key normalization.
//!
//! Every field value that participates in an index is normalized into a
//! [`KeyPart`]. Booleans, null and missing fields get their own stable
//! variants so that they remain valid, totally ordered key components.
//! Composite indexes use an [`IndexKey`]: the ordered parts for each field of
//! the index's key path.

use crate::record::Record;
use crate::value::Value;
use std::fmt;

/// One normalized component of an index key.
///
/// Ordering is by variant first, then by content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    /// The field is absent from the record.
    Undefined,
    /// The field is explicitly null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Text value.
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Array of normalized parts.
    Array(Vec<KeyPart>),
    /// Nested map of normalized parts.
    Map(Vec<(String, KeyPart)>),
}

impl KeyPart {
    /// Normalizes a present field value.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::Integer(n) => KeyPart::Integer(*n),
            Value::Text(s) => KeyPart::Text(s.clone()),
            Value::Bytes(b) => KeyPart::Bytes(b.clone()),
            Value::Array(items) => KeyPart::Array(items.iter().map(KeyPart::from_value).collect()),
            Value::Map(map) => KeyPart::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), KeyPart::from_value(v)))
                    .collect(),
            ),
        }
    }

    /// Normalizes a possibly missing field value.
    #[must_use]
    pub fn from_field(value: Option<&Value>) -> Self {
        value.map_or(KeyPart::Undefined, KeyPart::from_value)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Undefined => write!(f, "<undefined>"),
            KeyPart::Null => write!(f, "<null>"),
            KeyPart::Bool(b) => write!(f, "<{b}>"),
            KeyPart::Integer(n) => write!(f, "{n}"),
            KeyPart::Text(s) => write!(f, "{s:?}"),
            KeyPart::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            KeyPart::Array(items) => write!(f, "<array of {}>", items.len()),
            KeyPart::Map(entries) => write!(f, "<map of {}>", entries.len()),
        }
    }
}

/// An ordered composite index key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(Vec<KeyPart>);

impl IndexKey {
    /// Creates a key from already normalized parts.
    #[must_use]
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Extracts the key for `key_path` from a record.
    ///
    /// Missing fields become [`KeyPart::Undefined`].
    #[must_use]
    pub fn from_record<S: AsRef<str>>(record: &Record, key_path: &[S]) -> Self {
        Self(
            key_path
                .iter()
                .map(|field| KeyPart::from_field(record.value_of(field.as_ref()).as_deref()))
                .collect(),
        )
    }

    /// Returns the key parts.
    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Returns the number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Fields;

    #[test]
    fn sentinels_are_distinct_from_text() {
        assert_ne!(KeyPart::from_value(&Value::Bool(true)), KeyPart::Text("true".into()));
        assert_ne!(KeyPart::from_value(&Value::Null), KeyPart::Text("null".into()));
        assert_ne!(KeyPart::from_field(None), KeyPart::Null);
    }

    #[test]
    fn key_from_record_follows_key_path_order() {
        let record = Record::new(
            "r1",
            Fields::new()
                .with("calendar_id", "c1")
                .with("startDate", 100)
                .with("done", false),
        );
        let key = IndexKey::from_record(&record, &["startDate", "calendar_id", "missing"]);
        assert_eq!(
            key.parts(),
            &[
                KeyPart::Integer(100),
                KeyPart::Text("c1".into()),
                KeyPart::Undefined,
            ]
        );
    }

    #[test]
    fn key_from_record_can_use_id() {
        let record = Record::new("r1", Fields::new());
        let key = IndexKey::from_record(&record, &["id"]);
        assert_eq!(key.parts(), &[KeyPart::Text("r1".into())]);
    }

    #[test]
    fn keys_order_component_wise() {
        let a = IndexKey::new(vec![KeyPart::Text("c1".into()), KeyPart::Integer(1)]);
        let b = IndexKey::new(vec![KeyPart::Text("c1".into()), KeyPart::Integer(2)]);
        let c = IndexKey::new(vec![KeyPart::Text("c2".into()), KeyPart::Integer(0)]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn display() {
        let key = IndexKey::new(vec![KeyPart::Text("c1".into()), KeyPart::Bool(true)]);
        assert_eq!(key.to_string(), "(\"c1\", <true>)");
    }
}
