//! Records and field maps.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::borrow::Cow;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Name of the primary key field every record carries.
pub const ID_FIELD: &str = "id";

/// An ordered map of field names to values.
///
/// `Fields` is used for record bodies, partial updates and insert payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    /// Creates an empty field map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field and returns the map (builder style).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Gets a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over fields in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Iterates over field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns a copy with `other` laid over `self`.
    #[must_use]
    pub fn merged(&self, other: &Fields) -> Fields {
        let mut out = self.clone();
        out.0
            .extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    /// Removes the primary key field, if present.
    #[must_use]
    pub fn without_id(mut self) -> Self {
        self.0.remove(ID_FIELD);
        self
    }

    /// Converts into a map [`Value`].
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Map(self.0)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<BTreeMap<String, Value>> for Fields {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// A stored record: a unique id plus its fields.
///
/// Records are plain values. Callers always receive copies; the canonical
/// copy lives in the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    id: String,
    fields: Fields,
}

impl Record {
    /// Creates a record. An `id` entry inside `fields` is discarded.
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields: fields.without_id(),
        }
    }

    /// Returns the record id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the record fields (without the id).
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Consumes the record, returning its fields.
    #[must_use]
    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Gets a non-id field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Gets any field value, including the id as a text value.
    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<Cow<'_, Value>> {
        if name == ID_FIELD {
            Some(Cow::Owned(Value::Text(self.id.clone())))
        } else {
            self.fields.get(name).map(Cow::Borrowed)
        }
    }

    /// Returns a new record with `update` merged over the fields.
    ///
    /// The id is immutable: an `id` entry in `update` is ignored.
    #[must_use]
    pub fn merged(&self, update: &Fields) -> Record {
        Record::new(self.id.clone(), self.fields.merged(update))
    }

    /// Converts into a map value that includes the id.
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut map = self.fields.0;
        map.insert(ID_FIELD.to_string(), Value::Text(self.id));
        Value::Map(map)
    }

    /// Builds a record from a map value that includes a text id.
    pub fn from_value(value: Value) -> CodecResult<Self> {
        let Value::Map(mut map) = value else {
            return Err(CodecError::invalid_structure("record must be a map"));
        };
        match map.remove(ID_FIELD) {
            Some(Value::Text(id)) => Ok(Self {
                id,
                fields: Fields(map),
            }),
            Some(_) => Err(CodecError::invalid_structure("record id must be text")),
            None => Err(CodecError::invalid_structure("record has no id")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_strips_id_field() {
        let record = Record::new("a", Fields::new().with("id", "b").with("v", 1));
        assert_eq!(record.id(), "a");
        assert!(!record.fields().contains(ID_FIELD));
    }

    #[test]
    fn value_of_reports_id() {
        let record = Record::new("a", Fields::new().with("v", 1));
        assert_eq!(record.value_of("id").as_deref(), Some(&Value::from("a")));
        assert_eq!(record.value_of("v").as_deref(), Some(&Value::from(1)));
        assert_eq!(record.value_of("w"), None);
    }

    #[test]
    fn merged_keeps_id_and_overwrites_fields() {
        let record = Record::new("a", Fields::new().with("v", 1).with("w", 2));
        let updated = record.merged(&Fields::new().with("v", 5).with("id", "zzz"));
        assert_eq!(updated.id(), "a");
        assert_eq!(updated.get("v"), Some(&Value::from(5)));
        assert_eq!(updated.get("w"), Some(&Value::from(2)));
        // original untouched
        assert_eq!(record.get("v"), Some(&Value::from(1)));
    }

    #[test]
    fn value_conversion() {
        let record = Record::new("a", Fields::new().with("title", "X"));
        let value = record.clone().into_value();
        assert_eq!(value.get("id"), Some(&Value::from("a")));
        assert_eq!(Record::from_value(value).unwrap(), record);
    }

    #[test]
    fn from_value_requires_text_id() {
        let missing = Fields::new().with("title", "X").into_value();
        assert!(Record::from_value(missing).is_err());

        let numeric = Fields::new().with("id", 3).into_value();
        assert!(Record::from_value(numeric).is_err());
    }

    #[test]
    fn fields_from_iter() {
        let fields: Fields = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
