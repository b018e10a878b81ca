//! Object store schemas and index descriptors.

use crate::error::{StorageError, StorageResult};
use almanac_codec::{CodecError, Value};
use std::collections::{BTreeMap, HashSet};

/// Options for an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// A named composite index over an ordered list of record fields.
///
/// The default name is the key path joined with `,`, so an index over
/// `["calendar_id", "startDate"]` is named `calendar_id,startDate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    name: String,
    key_path: Vec<String>,
    options: IndexOptions,
}

impl IndexDescriptor {
    /// Creates an index over `key_path`.
    pub fn new<I, S>(key_path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_path: Vec<String> = key_path.into_iter().map(Into::into).collect();
        Self {
            name: key_path.join(","),
            key_path,
            options: IndexOptions::default(),
        }
    }

    /// Overrides the index name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ordered key path.
    #[must_use]
    pub fn key_path(&self) -> &[String] {
        &self.key_path
    }

    /// Returns the index options.
    #[must_use]
    pub fn options(&self) -> IndexOptions {
        self.options
    }

    /// Returns true if the index enforces uniqueness.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.options.unique
    }

    /// Returns true if `field` is part of the key path.
    #[must_use]
    pub fn covers(&self, field: &str) -> bool {
        self.key_path.iter().any(|f| f == field)
    }

    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::Text(self.name.clone()));
        map.insert(
            "key_path".to_string(),
            Value::Array(self.key_path.iter().cloned().map(Value::Text).collect()),
        );
        map.insert("unique".to_string(), Value::Bool(self.options.unique));
        Value::Map(map)
    }

    fn from_value(value: &Value) -> StorageResult<Self> {
        let name = value
            .get("name")
            .and_then(Value::as_text)
            .ok_or_else(|| CodecError::invalid_structure("index name missing"))?;
        let key_path = value
            .get("key_path")
            .and_then(Value::as_array)
            .ok_or_else(|| CodecError::invalid_structure("index key_path missing"))?
            .iter()
            .map(|f| {
                f.as_text()
                    .map(str::to_string)
                    .ok_or_else(|| CodecError::invalid_structure("key_path entries must be text"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let unique = value.get("unique").and_then(Value::as_bool).unwrap_or(false);

        let descriptor = Self::new(key_path).named(name);
        Ok(if unique { descriptor.unique() } else { descriptor })
    }
}

/// Schema of one object store: its name and secondary indexes.
///
/// Every object store is keyed by the record `id`. The set of indexes is
/// fixed for the lifetime of a backend handle; changing it means reopening
/// the backend with the new schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    name: String,
    indexes: Vec<IndexDescriptor>,
}

impl StoreSchema {
    /// Creates a schema with no secondary indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    /// Adds an index (builder style).
    #[must_use]
    pub fn index(mut self, descriptor: IndexDescriptor) -> Self {
        self.indexes.push(descriptor);
        self
    }

    /// Returns the object store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the indexes in registration order.
    #[must_use]
    pub fn indexes(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn index_named(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|d| d.name == name)
    }

    /// Checks that index names are unique and key paths are non-empty.
    pub fn validate(&self) -> StorageResult<()> {
        if self.name.is_empty() {
            return Err(StorageError::InvalidSchema(
                "object store name is empty".into(),
            ));
        }
        let mut seen = HashSet::new();
        for index in &self.indexes {
            if index.key_path.is_empty() {
                return Err(StorageError::InvalidSchema(format!(
                    "index {} has an empty key path",
                    index.name
                )));
            }
            if !seen.insert(index.name.as_str()) {
                return Err(StorageError::InvalidSchema(format!(
                    "duplicate index name {}",
                    index.name
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::Text(self.name.clone()));
        map.insert(
            "indexes".to_string(),
            Value::Array(self.indexes.iter().map(IndexDescriptor::to_value).collect()),
        );
        Value::Map(map)
    }

    pub(crate) fn from_value(value: &Value) -> StorageResult<Self> {
        let name = value
            .get("name")
            .and_then(Value::as_text)
            .ok_or_else(|| CodecError::invalid_structure("schema name missing"))?;
        let indexes = value
            .get("indexes")
            .and_then(Value::as_array)
            .ok_or_else(|| CodecError::invalid_structure("schema indexes missing"))?
            .iter()
            .map(IndexDescriptor::from_value)
            .collect::<StorageResult<Vec<_>>>()?;
        let schema = Self {
            name: name.to_string(),
            indexes,
        };
        schema.validate()?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_index_name_joins_key_path() {
        let index = IndexDescriptor::new(["calendar_id", "startDate"]);
        assert_eq!(index.name(), "calendar_id,startDate");
        assert!(!index.is_unique());
        assert!(index.covers("startDate"));
        assert!(!index.covers("title"));
    }

    #[test]
    fn builder() {
        let schema = StoreSchema::new("events")
            .index(IndexDescriptor::new(["calendar_id"]))
            .index(IndexDescriptor::new(["uid"]).named("by_uid").unique());

        assert_eq!(schema.indexes().len(), 2);
        assert!(schema.index_named("by_uid").unwrap().is_unique());
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn duplicate_index_names_are_rejected() {
        let schema = StoreSchema::new("events")
            .index(IndexDescriptor::new(["a"]))
            .index(IndexDescriptor::new(["b"]).named("a"));
        assert!(matches!(
            schema.validate(),
            Err(StorageError::InvalidSchema(_))
        ));
    }

    #[test]
    fn empty_key_path_is_rejected() {
        let schema = StoreSchema::new("events").index(IndexDescriptor::new(Vec::<String>::new()));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn schema_value_conversion() {
        let schema = StoreSchema::new("tasks")
            .index(IndexDescriptor::new(["done", "due"]))
            .index(IndexDescriptor::new(["uid"]).unique());
        let restored = StoreSchema::from_value(&schema.to_value()).unwrap();
        assert_eq!(restored, schema);
    }
}
