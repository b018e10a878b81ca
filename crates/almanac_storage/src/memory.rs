//! In-memory storage backend.

use crate::backend::{StorageBackend, StoreTransaction, TransactionMode};
use crate::cursor::{Cursor, ScanRange};
use crate::error::{StorageError, StorageResult};
use crate::schema::StoreSchema;
use crate::table::Table;
use almanac_codec::{IndexKey, Record};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock as AsyncRwLock};

/// An in-memory storage backend.
///
/// This backend keeps all object stores in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral data that doesn't need persistence
///
/// # Thread Safety
///
/// Each object store sits behind an async read-write lock. Read-only
/// transactions share it; a read-write transaction holds it exclusively
/// until it commits or is dropped.
///
/// # Example
///
/// ```rust
/// use almanac_codec::{Fields, Record};
/// use almanac_storage::{
///     InMemoryBackend, StorageBackend, StoreSchema, StoreTransaction, TransactionMode,
/// };
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let backend = InMemoryBackend::open([StoreSchema::new("events")]).unwrap();
///
/// let mut txn = backend.transaction("events", TransactionMode::ReadWrite).await.unwrap();
/// txn.add(Record::new("e1", Fields::new().with("title", "Standup"))).await.unwrap();
/// txn.commit().await.unwrap();
///
/// let txn = backend.transaction("events", TransactionMode::ReadOnly).await.unwrap();
/// assert!(txn.get("e1").await.unwrap().is_some());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    stores: RwLock<BTreeMap<String, StoreEntry>>,
}

#[derive(Debug, Clone)]
struct StoreEntry {
    schema: StoreSchema,
    table: Arc<AsyncRwLock<Table>>,
}

impl StoreEntry {
    fn new(table: Table) -> Self {
        Self {
            schema: table.schema().clone(),
            table: Arc::new(AsyncRwLock::new(table)),
        }
    }
}

impl InMemoryBackend {
    /// Creates a backend with no object stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with the given object stores.
    ///
    /// # Errors
    ///
    /// Returns an error if a schema is invalid or two schemas share a name.
    pub fn open(schemas: impl IntoIterator<Item = StoreSchema>) -> StorageResult<Self> {
        let backend = Self::new();
        for schema in schemas {
            backend.define_store(schema)?;
        }
        Ok(backend)
    }

    /// Defines an empty object store.
    ///
    /// Defining a store again with an identical schema is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SchemaMismatch`] if the store exists with a
    /// different schema, or [`StorageError::InvalidSchema`].
    pub fn define_store(&self, schema: StoreSchema) -> StorageResult<()> {
        schema.validate()?;
        let mut stores = self.stores.write();
        if let Some(existing) = stores.get(schema.name()) {
            return if existing.schema == schema {
                Ok(())
            } else {
                Err(StorageError::SchemaMismatch {
                    store: schema.name().to_string(),
                })
            };
        }
        tracing::debug!(
            store = schema.name(),
            indexes = schema.indexes().len(),
            "defined object store"
        );
        stores.insert(schema.name().to_string(), StoreEntry::new(Table::new(schema)));
        Ok(())
    }

    /// Installs a fully built table, replacing any store of the same name.
    pub(crate) fn install(&self, table: Table) {
        self.stores
            .write()
            .insert(table.schema().name().to_string(), StoreEntry::new(table));
    }

    fn entry(&self, store: &str) -> StorageResult<StoreEntry> {
        self.stores
            .read()
            .get(store)
            .cloned()
            .ok_or_else(|| StorageError::store_not_found(store))
    }
}

impl StorageBackend for InMemoryBackend {
    type Transaction = MemoryTransaction;

    fn schema(&self, store: &str) -> StorageResult<StoreSchema> {
        Ok(self.entry(store)?.schema)
    }

    fn store_names(&self) -> Vec<String> {
        self.stores.read().keys().cloned().collect()
    }

    async fn transaction(
        &self,
        store: &str,
        mode: TransactionMode,
    ) -> StorageResult<MemoryTransaction> {
        let table = self.entry(store)?.table;
        let guard = match mode {
            TransactionMode::ReadOnly => TableGuard::Read(table.read_owned().await),
            TransactionMode::ReadWrite => TableGuard::Write(table.write_owned().await),
        };
        Ok(MemoryTransaction {
            store: store.to_string(),
            mode,
            guard,
            undo: Vec::new(),
            finished: false,
        })
    }
}

#[derive(Debug)]
enum TableGuard {
    Read(OwnedRwLockReadGuard<Table>),
    Write(OwnedRwLockWriteGuard<Table>),
}

impl TableGuard {
    fn table(&self) -> &Table {
        match self {
            TableGuard::Read(guard) => &**guard,
            TableGuard::Write(guard) => &**guard,
        }
    }

    fn table_mut(&mut self) -> StorageResult<&mut Table> {
        match self {
            TableGuard::Read(_) => Err(StorageError::ReadOnly),
            TableGuard::Write(guard) => Ok(&mut **guard),
        }
    }
}

/// A transaction over an [`InMemoryBackend`] object store.
///
/// Writes apply immediately to the locked table and are recorded in an undo
/// log. Dropping the transaction without committing replays the log.
#[derive(Debug)]
pub struct MemoryTransaction {
    store: String,
    mode: TransactionMode,
    guard: TableGuard,
    undo: Vec<(String, Option<Record>)>,
    finished: bool,
}

impl MemoryTransaction {
    pub(crate) fn table(&self) -> &Table {
        self.guard.table()
    }

    /// Returns true if the transaction has written anything.
    pub(crate) fn is_dirty(&self) -> bool {
        !self.undo.is_empty()
    }

    fn rollback(&mut self) {
        if let TableGuard::Write(table) = &mut self.guard {
            for (id, prior) in self.undo.drain(..).rev() {
                table.restore(&id, prior);
            }
        }
    }
}

impl StoreTransaction for MemoryTransaction {
    fn store(&self) -> &str {
        &self.store
    }

    fn mode(&self) -> TransactionMode {
        self.mode
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Record>> {
        Ok(self.table().get(id).cloned())
    }

    async fn get_by_index(&self, index: &str, key: &IndexKey) -> StorageResult<Vec<Record>> {
        Ok(self
            .table()
            .lookup(index, key)?
            .into_iter()
            .cloned()
            .collect())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.table().len())
    }

    async fn open_cursor(&self, range: &ScanRange) -> StorageResult<Cursor> {
        let records = match range {
            ScanRange::All => self.table().records().cloned().collect(),
            ScanRange::Index { index, key } => self
                .table()
                .lookup(index, key)?
                .into_iter()
                .cloned()
                .collect(),
        };
        Ok(Cursor::new(records))
    }

    async fn add(&mut self, record: Record) -> StorageResult<()> {
        let table = self.guard.table_mut()?;
        if table.get(record.id()).is_some() {
            return Err(StorageError::KeyExists {
                id: record.id().to_string(),
            });
        }
        let id = record.id().to_string();
        table.put(record)?;
        self.undo.push((id, None));
        Ok(())
    }

    async fn put(&mut self, record: Record) -> StorageResult<Option<Record>> {
        let table = self.guard.table_mut()?;
        let id = record.id().to_string();
        let previous = table.put(record)?;
        self.undo.push((id, previous.clone()));
        Ok(previous)
    }

    async fn delete(&mut self, id: &str) -> StorageResult<Option<Record>> {
        let table = self.guard.table_mut()?;
        let previous = table.delete(id);
        if previous.is_some() {
            self.undo.push((id.to_string(), previous.clone()));
        }
        Ok(previous)
    }

    async fn commit(mut self) -> StorageResult<()> {
        self.finished = true;
        self.undo.clear();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.undo.is_empty() {
            tracing::debug!(
                store = %self.store,
                writes = self.undo.len(),
                "rolling back uncommitted transaction"
            );
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexDescriptor;
    use almanac_codec::{Fields, KeyPart};

    fn backend() -> InMemoryBackend {
        InMemoryBackend::open([StoreSchema::new("events")
            .index(IndexDescriptor::new(["calendar_id"]))
            .index(IndexDescriptor::new(["uid"]).unique())])
        .unwrap()
    }

    fn event(id: &str, calendar: &str) -> Record {
        Record::new(id, Fields::new().with("calendar_id", calendar))
    }

    #[tokio::test]
    async fn add_commit_and_read() {
        let backend = backend();
        let mut txn = backend
            .transaction("events", TransactionMode::ReadWrite)
            .await
            .unwrap();
        txn.add(event("a", "c1")).await.unwrap();
        txn.add(event("b", "c1")).await.unwrap();
        txn.commit().await.unwrap();

        let txn = backend
            .transaction("events", TransactionMode::ReadOnly)
            .await
            .unwrap();
        assert_eq!(txn.count().await.unwrap(), 2);
        let key = IndexKey::new(vec![KeyPart::Text("c1".into())]);
        assert_eq!(txn.get_by_index("calendar_id", &key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn add_existing_key_fails() {
        let backend = backend();
        let mut txn = backend
            .transaction("events", TransactionMode::ReadWrite)
            .await
            .unwrap();
        txn.add(event("a", "c1")).await.unwrap();
        let err = txn.add(event("a", "c2")).await.unwrap_err();
        assert!(matches!(err, StorageError::KeyExists { ref id } if id == "a"));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let backend = backend();
        let mut txn = backend
            .transaction("events", TransactionMode::ReadWrite)
            .await
            .unwrap();
        txn.add(event("a", "c1")).await.unwrap();
        txn.commit().await.unwrap();

        let mut txn = backend
            .transaction("events", TransactionMode::ReadWrite)
            .await
            .unwrap();
        txn.put(event("a", "c2")).await.unwrap();
        txn.add(event("b", "c1")).await.unwrap();
        txn.delete("a").await.unwrap();
        txn.abort();

        let txn = backend
            .transaction("events", TransactionMode::ReadOnly)
            .await
            .unwrap();
        assert_eq!(txn.get("a").await.unwrap(), Some(event("a", "c1")));
        assert!(txn.get("b").await.unwrap().is_none());
        let key = IndexKey::new(vec![KeyPart::Text("c2".into())]);
        assert!(txn.get_by_index("calendar_id", &key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_only_rejects_writes() {
        let backend = backend();
        let mut txn = backend
            .transaction("events", TransactionMode::ReadOnly)
            .await
            .unwrap();
        assert!(matches!(
            txn.add(event("a", "c1")).await,
            Err(StorageError::ReadOnly)
        ));
        assert!(matches!(txn.delete("a").await, Err(StorageError::ReadOnly)));
    }

    #[tokio::test]
    async fn unknown_store() {
        let backend = backend();
        let err = backend
            .transaction("tasks", TransactionMode::ReadOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::StoreNotFound { .. }));
        assert!(backend.schema("tasks").is_err());
    }

    #[tokio::test]
    async fn cursor_over_index() {
        let backend = backend();
        let mut txn = backend
            .transaction("events", TransactionMode::ReadWrite)
            .await
            .unwrap();
        for (id, cal) in [("a", "c1"), ("b", "c2"), ("c", "c1")] {
            txn.add(event(id, cal)).await.unwrap();
        }
        let range = ScanRange::index(
            "calendar_id",
            IndexKey::new(vec![KeyPart::Text("c1".into())]),
        );
        let ids: Vec<_> = txn
            .open_cursor(&range)
            .await
            .unwrap()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(txn.open_cursor(&ScanRange::All).await.unwrap().count(), 3);
    }

    #[test]
    fn define_store_is_idempotent_for_same_schema() {
        let backend = backend();
        let schema = backend.schema("events").unwrap();
        backend.define_store(schema).unwrap();
        assert!(matches!(
            backend.define_store(StoreSchema::new("events")),
            Err(StorageError::SchemaMismatch { .. })
        ));
        assert_eq!(backend.store_names(), ["events"]);
    }
}
