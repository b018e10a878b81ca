//! Fault injection for storage backends.
//!
//! [`FlakyBackend`] wraps an [`InMemoryBackend`] and fails selected requests
//! with [`StorageError::Aborted`], the way a browser object store aborts a
//! request. Write faults target a record id or a field value; read faults
//! fail any lookup, index query, count or cursor. Faults fire a fixed number
//! of times or forever.
//!
//! ## Usage
//!
//! ```rust
//! use almanac_testkit::faults::{Fault, FlakyBackend};
//! use almanac_storage::StoreSchema;
//!
//! let backend = FlakyBackend::open([StoreSchema::new("events")]).unwrap();
//! backend.inject(Fault::on_id("e1").times(1));
//! backend.inject(Fault::on_field("title", "boom").always());
//! backend.inject(Fault::on_read().times(2));
//! assert_eq!(backend.armed(), 3);
//! ```

use almanac_codec::{IndexKey, Record, Value};
use almanac_storage::{
    Cursor, InMemoryBackend, MemoryTransaction, ScanRange, StorageBackend, StorageError,
    StorageResult, StoreSchema, StoreTransaction, TransactionMode,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Which requests a fault applies to.
#[derive(Debug, Clone, PartialEq)]
enum Target {
    Id(String),
    Field(String, Value),
    Reads,
}

/// A request failure to inject.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    target: Target,
    remaining: Option<usize>,
}

impl Fault {
    /// Fails writes to the record with this id.
    pub fn on_id(id: impl Into<String>) -> Self {
        Self {
            target: Target::Id(id.into()),
            remaining: Some(1),
        }
    }

    /// Fails writes of records whose `field` equals `value`.
    ///
    /// Deletes only carry an id and never match a field fault.
    pub fn on_field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            target: Target::Field(field.into(), value.into()),
            remaining: Some(1),
        }
    }

    /// Fails every read: lookups, index queries, counts and cursors.
    pub fn on_read() -> Self {
        Self {
            target: Target::Reads,
            remaining: Some(1),
        }
    }

    /// Fires `n` times, then disarms.
    #[must_use]
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    /// Fires on every matching request.
    #[must_use]
    pub fn always(mut self) -> Self {
        self.remaining = None;
        self
    }

    fn matches(&self, id: &str, record: Option<&Record>) -> bool {
        match &self.target {
            Target::Id(target) => target == id,
            Target::Field(field, value) => {
                record.and_then(|r| r.get(field)) == Some(value)
            }
            Target::Reads => false,
        }
    }

    fn is_armed(&self) -> bool {
        self.remaining != Some(0)
    }

    fn consume(&mut self) {
        if let Some(n) = self.remaining.as_mut() {
            *n -= 1;
        }
    }
}

type FaultPlan = Arc<Mutex<Vec<Fault>>>;

/// Fires the first armed fault matching the write, if any.
fn trip(plan: &FaultPlan, id: &str, record: Option<&Record>) -> StorageResult<()> {
    let mut faults = plan.lock();
    let Some(fault) = faults
        .iter_mut()
        .find(|f| f.is_armed() && f.matches(id, record))
    else {
        return Ok(());
    };
    fault.consume();
    tracing::debug!(id, "injected write fault");
    Err(StorageError::aborted(format!("injected fault on {id}")))
}

/// Fires the first armed read fault, if any.
fn trip_read(plan: &FaultPlan, store: &str) -> StorageResult<()> {
    let mut faults = plan.lock();
    let Some(fault) = faults
        .iter_mut()
        .find(|f| f.is_armed() && f.target == Target::Reads)
    else {
        return Ok(());
    };
    fault.consume();
    tracing::debug!(store, "injected read fault");
    Err(StorageError::aborted(format!("injected read fault on {store}")))
}

/// An in-memory backend whose requests fail on demand.
#[derive(Debug, Default)]
pub struct FlakyBackend {
    inner: InMemoryBackend,
    plan: FaultPlan,
}

impl FlakyBackend {
    /// Wraps an existing backend.
    pub fn new(inner: InMemoryBackend) -> Self {
        Self {
            inner,
            plan: FaultPlan::default(),
        }
    }

    /// Opens a backend with the given object stores.
    ///
    /// # Errors
    ///
    /// Returns an error if a schema is invalid.
    pub fn open(schemas: impl IntoIterator<Item = StoreSchema>) -> StorageResult<Self> {
        Ok(Self::new(InMemoryBackend::open(schemas)?))
    }

    /// Arms a fault.
    pub fn inject(&self, fault: Fault) {
        self.plan.lock().push(fault);
    }

    /// Disarms every fault.
    pub fn clear(&self) {
        self.plan.lock().clear();
    }

    /// Returns the number of faults that can still fire.
    pub fn armed(&self) -> usize {
        self.plan.lock().iter().filter(|f| f.is_armed()).count()
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }
}

impl StorageBackend for FlakyBackend {
    type Transaction = FlakyTransaction;

    fn schema(&self, store: &str) -> StorageResult<StoreSchema> {
        self.inner.schema(store)
    }

    fn store_names(&self) -> Vec<String> {
        self.inner.store_names()
    }

    async fn transaction(
        &self,
        store: &str,
        mode: TransactionMode,
    ) -> StorageResult<FlakyTransaction> {
        Ok(FlakyTransaction {
            inner: self.inner.transaction(store, mode).await?,
            plan: Arc::clone(&self.plan),
        })
    }
}

/// A transaction over a [`FlakyBackend`].
#[derive(Debug)]
pub struct FlakyTransaction {
    inner: MemoryTransaction,
    plan: FaultPlan,
}

impl StoreTransaction for FlakyTransaction {
    fn store(&self) -> &str {
        self.inner.store()
    }

    fn mode(&self) -> TransactionMode {
        self.inner.mode()
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Record>> {
        trip_read(&self.plan, self.store())?;
        self.inner.get(id).await
    }

    async fn get_by_index(&self, index: &str, key: &IndexKey) -> StorageResult<Vec<Record>> {
        trip_read(&self.plan, self.store())?;
        self.inner.get_by_index(index, key).await
    }

    async fn count(&self) -> StorageResult<usize> {
        trip_read(&self.plan, self.store())?;
        self.inner.count().await
    }

    async fn open_cursor(&self, range: &ScanRange) -> StorageResult<Cursor> {
        trip_read(&self.plan, self.store())?;
        self.inner.open_cursor(range).await
    }

    async fn add(&mut self, record: Record) -> StorageResult<()> {
        trip(&self.plan, record.id(), Some(&record))?;
        self.inner.add(record).await
    }

    async fn put(&mut self, record: Record) -> StorageResult<Option<Record>> {
        trip(&self.plan, record.id(), Some(&record))?;
        self.inner.put(record).await
    }

    async fn delete(&mut self, id: &str) -> StorageResult<Option<Record>> {
        trip(&self.plan, id, None)?;
        self.inner.delete(id).await
    }

    async fn commit(self) -> StorageResult<()> {
        self.inner.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_codec::Fields;

    fn record(id: &str, title: &str) -> Record {
        Record::new(id, Fields::new().with("title", title))
    }

    #[tokio::test]
    async fn id_fault_fires_then_disarms() {
        let backend = FlakyBackend::open([StoreSchema::new("events")]).unwrap();
        backend.inject(Fault::on_id("e1"));

        let mut txn = backend
            .transaction("events", TransactionMode::ReadWrite)
            .await
            .unwrap();
        let err = txn.add(record("e1", "A")).await.unwrap_err();
        assert!(matches!(err, StorageError::Aborted { .. }));
        assert_eq!(backend.armed(), 0);

        txn.add(record("e1", "A")).await.unwrap();
        txn.add(record("e2", "B")).await.unwrap();
        txn.commit().await.unwrap();

        let txn = backend
            .transaction("events", TransactionMode::ReadOnly)
            .await
            .unwrap();
        assert_eq!(txn.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn field_fault_ignores_deletes() {
        let backend = FlakyBackend::open([StoreSchema::new("events")]).unwrap();
        backend.inject(Fault::on_field("title", "boom").always());

        let mut txn = backend
            .transaction("events", TransactionMode::ReadWrite)
            .await
            .unwrap();
        assert!(txn.put(record("e1", "boom")).await.is_err());
        assert!(txn.put(record("e1", "boom")).await.is_err());
        txn.put(record("e1", "fine")).await.unwrap();
        assert!(txn.delete("e1").await.unwrap().is_some());
        assert_eq!(backend.armed(), 1);

        backend.clear();
        assert_eq!(backend.armed(), 0);
    }

    #[tokio::test]
    async fn read_fault_spares_writes() {
        let backend = FlakyBackend::open([StoreSchema::new("events")]).unwrap();
        backend.inject(Fault::on_read().times(2));

        let mut txn = backend
            .transaction("events", TransactionMode::ReadWrite)
            .await
            .unwrap();
        txn.add(record("e1", "A")).await.unwrap();
        assert!(matches!(
            txn.get("e1").await.unwrap_err(),
            StorageError::Aborted { .. }
        ));
        assert!(txn.count().await.is_err());
        assert_eq!(backend.armed(), 0);

        assert_eq!(txn.count().await.unwrap(), 1);
        assert!(txn.delete("e1").await.unwrap().is_some());
        txn.commit().await.unwrap();
    }
}
