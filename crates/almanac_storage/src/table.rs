//! In-memory contents of one object store: records plus index trees.

use crate::error::{StorageError, StorageResult};
use crate::schema::{IndexDescriptor, StoreSchema};
use almanac_codec::{CodecError, IndexKey, KeyPart, Record, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One secondary index: key to the set of record ids carrying that key.
#[derive(Debug, Clone)]
struct IndexTree {
    descriptor: IndexDescriptor,
    entries: BTreeMap<IndexKey, BTreeSet<String>>,
}

impl IndexTree {
    fn new(descriptor: IndexDescriptor) -> Self {
        Self {
            descriptor,
            entries: BTreeMap::new(),
        }
    }

    fn key_for(&self, record: &Record) -> IndexKey {
        IndexKey::from_record(record, self.descriptor.key_path())
    }

    fn insert(&mut self, record: &Record) {
        let key = self.key_for(record);
        self.entries
            .entry(key)
            .or_default()
            .insert(record.id().to_string());
    }

    fn remove(&mut self, record: &Record) {
        let key = self.key_for(record);
        if let Some(ids) = self.entries.get_mut(&key) {
            ids.remove(record.id());
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Returns the key `record` would duplicate on a unique index, if any.
    ///
    /// Keys with a missing component are not indexed for uniqueness.
    fn conflicts(&self, record: &Record) -> Option<IndexKey> {
        if !self.descriptor.is_unique() {
            return None;
        }
        let key = self.key_for(record);
        if key.parts().iter().any(|p| matches!(p, KeyPart::Undefined)) {
            return None;
        }
        let taken = self
            .entries
            .get(&key)
            .is_some_and(|ids| ids.iter().any(|id| id != record.id()));
        taken.then_some(key)
    }
}

/// The records and indexes of one object store.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    schema: StoreSchema,
    records: BTreeMap<String, Record>,
    indexes: Vec<IndexTree>,
}

impl Table {
    pub(crate) fn new(schema: StoreSchema) -> Self {
        let indexes = schema
            .indexes()
            .iter()
            .cloned()
            .map(IndexTree::new)
            .collect();
        Self {
            schema,
            records: BTreeMap::new(),
            indexes,
        }
    }

    /// Builds a table and its index trees from existing records.
    pub(crate) fn from_records(
        schema: StoreSchema,
        records: impl IntoIterator<Item = Record>,
    ) -> StorageResult<Self> {
        let mut table = Self::new(schema);
        for record in records {
            table.put(record)?;
        }
        Ok(table)
    }

    pub(crate) fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Returns the records whose key on `index` equals `key`, in id order.
    pub(crate) fn lookup(&self, index: &str, key: &IndexKey) -> StorageResult<Vec<&Record>> {
        let tree = self
            .indexes
            .iter()
            .find(|t| t.descriptor.name() == index)
            .ok_or_else(|| StorageError::IndexNotFound {
                store: self.schema.name().to_string(),
                index: index.to_string(),
            })?;
        Ok(tree
            .entries
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
            .collect())
    }

    fn check_unique(&self, record: &Record) -> StorageResult<()> {
        for tree in &self.indexes {
            if let Some(key) = tree.conflicts(record) {
                return Err(StorageError::ConstraintViolation {
                    index: tree.descriptor.name().to_string(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Inserts or replaces a record, returning the previous version.
    pub(crate) fn put(&mut self, record: Record) -> StorageResult<Option<Record>> {
        self.check_unique(&record)?;
        let previous = self.records.remove(record.id());
        if let Some(old) = &previous {
            for tree in &mut self.indexes {
                tree.remove(old);
            }
        }
        for tree in &mut self.indexes {
            tree.insert(&record);
        }
        self.records.insert(record.id().to_string(), record);
        Ok(previous)
    }

    /// Removes a record, returning it if it existed.
    pub(crate) fn delete(&mut self, id: &str) -> Option<Record> {
        let old = self.records.remove(id)?;
        for tree in &mut self.indexes {
            tree.remove(&old);
        }
        Some(old)
    }

    /// Puts back a prior version of a record (or its absence).
    ///
    /// Used to undo aborted writes, which never leave the table in a state
    /// that violates a unique index, so this cannot fail.
    pub(crate) fn restore(&mut self, id: &str, prior: Option<Record>) {
        if let Some(old) = self.records.remove(id) {
            for tree in &mut self.indexes {
                tree.remove(&old);
            }
        }
        if let Some(record) = prior {
            for tree in &mut self.indexes {
                tree.insert(&record);
            }
            self.records.insert(id.to_string(), record);
        }
    }

    /// Encodes the table as a persisted store document.
    pub(crate) fn to_value(&self, format: i64) -> Value {
        let mut map = BTreeMap::new();
        map.insert("format".to_string(), Value::Integer(format));
        map.insert("schema".to_string(), self.schema.to_value());
        map.insert(
            "records".to_string(),
            Value::Array(self.records.values().cloned().map(Record::into_value).collect()),
        );
        Value::Map(map)
    }

    /// Decodes a persisted store document, returning its stored schema and
    /// records.
    pub(crate) fn decode(value: Value) -> StorageResult<(i64, StoreSchema, Vec<Record>)> {
        let Value::Map(mut map) = value else {
            return Err(StorageError::Corrupted("store document is not a map".into()));
        };
        let format = map
            .get("format")
            .and_then(Value::as_integer)
            .ok_or_else(|| StorageError::Corrupted("store document has no format".into()))?;
        let schema = map
            .get("schema")
            .ok_or_else(|| StorageError::Corrupted("store document has no schema".into()))
            .and_then(StoreSchema::from_value)?;
        let Some(Value::Array(items)) = map.remove("records") else {
            return Err(CodecError::invalid_structure("store document has no records").into());
        };
        let records = items
            .into_iter()
            .map(Record::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((format, schema, records))
    }
}
