//! The bulk transaction state machine.

use super::operation::{BulkOperation, OperationKind};
use crate::error::{CoreError, CoreResult};
use crate::query::Query;
use crate::store::RecordStore;
use almanac_codec::{Fields, Record};
use almanac_storage::StorageBackend;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::mem;
use uuid::Uuid;

/// Lifecycle of a bulk transaction.
///
/// ```text
/// NotStarted -> Committing -> Committed
///                   |
///                   v
///               Retrying -> Committed
///                   |
///                   v
///              RollingBack -> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// Still accepting operations.
    NotStarted,
    /// First attempt in progress.
    Committing,
    /// Waiting for or running the single retry.
    Retrying,
    /// Undoing the operations that went through.
    RollingBack,
    /// Every operation went through. Terminal.
    Committed,
    /// The batch failed and was cleanly undone. Terminal.
    RolledBack,
}

/// An applied operation and the operation that undoes it.
struct Applied {
    /// Provisional handle of an applied insert.
    handle: Option<String>,
    reverse: BulkOperation,
}

type Failed = (BulkOperation, CoreError);

/// A batch of inserts, updates and deletes applied with all-or-nothing
/// intent.
///
/// The transaction starts from a working set of records, each with a
/// [`OperationKind::Nothing`] operation. [`update`](Self::update),
/// [`insert`](Self::insert) and [`delete`](Self::delete) edit that set;
/// there is at most one operation per record. [`commit`](Self::commit)
/// then applies every operation concurrently against the record store:
///
/// - if all succeed the transaction is committed
/// - otherwise the failures are retried once after the configured delay
/// - if any still fail, every applied operation is reversed and the caller
///   gets [`CoreError::RolledBack`], or [`CoreError::CannotRollback`] when
///   a reverse operation fails too
///
/// No lock is held on the store between steps; concurrent writers can
/// interleave with the batch.
pub struct BulkTransaction<'s, B: StorageBackend> {
    store: &'s RecordStore<B>,
    operations: Vec<BulkOperation>,
    state: CommitState,
    rollback_log: Vec<BulkOperation>,
    pending: Vec<BulkOperation>,
    inserted: BTreeMap<String, String>,
}

impl<B: StorageBackend> std::fmt::Debug for BulkTransaction<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkTransaction")
            .field("store", &self.store.name())
            .field("state", &self.state)
            .field("operations", &self.operations)
            .field("pending", &self.pending.len())
            .field("rollback_log", &self.rollback_log.len())
            .finish()
    }
}

impl<'s, B: StorageBackend> BulkTransaction<'s, B> {
    /// Creates a transaction over a working set of records.
    pub fn new(records: impl IntoIterator<Item = Record>, store: &'s RecordStore<B>) -> Self {
        Self {
            store,
            operations: records.into_iter().map(BulkOperation::nothing).collect(),
            state: CommitState::NotStarted,
            rollback_log: Vec::new(),
            pending: Vec::new(),
            inserted: BTreeMap::new(),
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> CommitState {
        self.state
    }

    /// Returns the operations in working-set order.
    #[must_use]
    pub fn operations(&self) -> &[BulkOperation] {
        &self.operations
    }

    /// Returns the operation for a record id or insert handle.
    #[must_use]
    pub fn operation(&self, id: &str) -> Option<&BulkOperation> {
        self.operations.iter().find(|op| op.id() == id)
    }

    /// Returns the stored id of an applied insert, by its provisional handle.
    #[must_use]
    pub fn inserted_id(&self, handle: &str) -> Option<&str> {
        self.inserted.get(handle).map(String::as_str)
    }

    /// Returns the operations waiting for a retry.
    #[must_use]
    pub fn pending(&self) -> &[BulkOperation] {
        &self.pending
    }

    /// Returns the reverse operations that a rollback would apply.
    #[must_use]
    pub fn rollback_log(&self) -> &[BulkOperation] {
        &self.rollback_log
    }

    fn ensure_open(&self) -> CoreResult<()> {
        match self.state {
            CommitState::NotStarted => Ok(()),
            CommitState::Committed => Err(CoreError::AlreadyCommitted),
            CommitState::RolledBack => {
                Err(CoreError::cannot_retry("bulk transaction was rolled back"))
            }
            _ => Err(CoreError::cannot_retry("commit already in progress")),
        }
    }

    fn entry_mut(&mut self, id: &str) -> CoreResult<&mut BulkOperation> {
        self.operations
            .iter_mut()
            .find(|op| op.id() == id)
            .ok_or_else(|| CoreError::RegistryNotFound { id: id.to_string() })
    }

    /// Merges `update` over a record of the working set.
    ///
    /// A pending insert stays an insert with the merged values. A record
    /// scheduled for deletion is kept and updated instead. Returns the record
    /// as it will be written.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RegistryNotFound`] if the id is not in the
    /// working set.
    pub fn update(&mut self, id: &str, update: Fields) -> CoreResult<Record> {
        self.ensure_open()?;
        let op = self.entry_mut(id)?;
        op.apply_update(&update.without_id());
        Ok(op.record())
    }

    /// Schedules a new record.
    ///
    /// The returned record carries a provisional handle as its id; use it
    /// to update or delete the pending insert. The stored id is generated
    /// when the commit starts, reused by the retry, and available from
    /// [`inserted_id`](Self::inserted_id) once the insert went through.
    ///
    /// # Errors
    ///
    /// Returns an error once the commit has started.
    pub fn insert(&mut self, fields: Fields) -> CoreResult<Record> {
        self.ensure_open()?;
        let op = BulkOperation::insert(Uuid::new_v4().to_string(), fields);
        let record = op.record();
        self.operations.push(op);
        Ok(record)
    }

    /// Schedules a record for deletion.
    ///
    /// Deleting a pending insert cancels it. Deleting twice is the same as
    /// deleting once.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RegistryNotFound`] if the id is not in the
    /// working set.
    pub fn delete(&mut self, id: &str) -> CoreResult<()> {
        self.ensure_open()?;
        self.entry_mut(id)?.apply_delete();
        Ok(())
    }

    /// Applies every operation.
    ///
    /// # Errors
    ///
    /// - [`CoreError::RolledBack`] if the batch failed and was undone
    /// - [`CoreError::CannotRollback`] if undoing it failed as well
    /// - [`CoreError::AlreadyCommitted`] on a second call after success
    pub async fn commit(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        self.state = CommitState::Committing;
        for op in &mut self.operations {
            if op.kind() == OperationKind::Insert {
                op.assign_stored_id(|| Uuid::new_v4().to_string());
            }
        }
        let operations = self.operations.clone();
        tracing::debug!(
            store = self.store.name(),
            operations = operations.len(),
            "committing bulk transaction"
        );

        let (applied, failed) = Self::try_commit(self.store, operations).await;
        self.record_applied(applied);
        if failed.is_empty() {
            self.finish_committed();
            return Ok(());
        }

        for (op, err) in &failed {
            tracing::warn!(
                store = self.store.name(),
                operation = %op,
                error = %err,
                "bulk operation failed; retrying"
            );
        }
        self.pending = failed.into_iter().map(|(op, _)| op).collect();
        tokio::time::sleep(self.store.config().retry_delay).await;
        self.state = CommitState::Retrying;
        self.retry().await
    }

    /// Re-applies the operations that failed on the first attempt.
    ///
    /// Called by [`commit`](Self::commit); rolls back if anything fails
    /// again.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CannotRetry`] outside the retrying state or with
    /// nothing left to apply, and the rollback outcome otherwise.
    pub async fn retry(&mut self) -> CoreResult<()> {
        match self.state {
            CommitState::Retrying => {}
            CommitState::Committed => return Err(CoreError::AlreadyCommitted),
            _ => {
                return Err(CoreError::cannot_retry(
                    "bulk transaction is not awaiting a retry",
                ))
            }
        }
        if self.pending.is_empty() {
            return Err(CoreError::cannot_retry("nothing else to commit"));
        }

        let pending = mem::take(&mut self.pending);
        let (applied, failed) = Self::try_commit(self.store, pending).await;
        self.record_applied(applied);
        if failed.is_empty() {
            self.finish_committed();
            return Ok(());
        }

        for (op, err) in &failed {
            tracing::warn!(
                store = self.store.name(),
                operation = %op,
                error = %err,
                "bulk operation failed again; rolling back"
            );
        }
        self.pending = failed.into_iter().map(|(op, _)| op).collect();
        self.state = CommitState::RollingBack;
        self.rollback().await
    }

    /// Applies the reverse of every operation that went through.
    ///
    /// # Errors
    ///
    /// Always returns an error: [`CoreError::RolledBack`] when the store was
    /// restored, [`CoreError::CannotRollback`] when a reverse operation
    /// failed. Failed reverse operations stay in the rollback log, so a
    /// later call retries just those.
    pub async fn rollback(&mut self) -> CoreResult<()> {
        match self.state {
            CommitState::RollingBack => {}
            CommitState::Committed => return Err(CoreError::AlreadyCommitted),
            _ => {
                return Err(CoreError::cannot_rollback(
                    "bulk transaction is not rolling back",
                ))
            }
        }

        let reverses = mem::take(&mut self.rollback_log);
        let (_, failed) = Self::try_commit(self.store, reverses).await;
        if failed.is_empty() {
            tracing::info!(
                store = self.store.name(),
                failed = self.pending.len(),
                "bulk transaction rolled back"
            );
            self.state = CommitState::RolledBack;
            self.inserted.clear();
            return Err(CoreError::RolledBack {
                failed: self.pending.len(),
            });
        }

        for (op, err) in &failed {
            tracing::error!(
                store = self.store.name(),
                operation = %op,
                error = %err,
                "reverse operation failed; store may be inconsistent"
            );
        }
        let reason = format!("{} reverse operation(s) failed", failed.len());
        self.rollback_log = failed.into_iter().map(|(op, _)| op).collect();
        Err(CoreError::cannot_rollback(reason))
    }

    fn record_applied(&mut self, applied: Vec<Applied>) {
        for Applied { handle, reverse } in applied {
            if let Some(handle) = handle {
                self.inserted.insert(handle, reverse.id().to_string());
            }
            self.rollback_log.push(reverse);
        }
    }

    fn finish_committed(&mut self) {
        tracing::debug!(store = self.store.name(), "bulk transaction committed");
        self.state = CommitState::Committed;
        self.rollback_log.clear();
    }

    /// Applies `operations` concurrently, waiting for all of them.
    async fn try_commit(
        store: &RecordStore<B>,
        operations: Vec<BulkOperation>,
    ) -> (Vec<Applied>, Vec<Failed>) {
        let outcomes = join_all(operations.into_iter().map(|op| apply(store, op))).await;
        let mut applied = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(done) => applied.push(done),
                Err(failure) => failed.push(failure),
            }
        }
        (applied, failed)
    }
}

/// Applies one operation, returning how to undo it.
async fn apply<B: StorageBackend>(
    store: &RecordStore<B>,
    op: BulkOperation,
) -> Result<Applied, Failed> {
    match apply_inner(store, &op).await {
        Ok(done) => Ok(done),
        Err(err) => Err((op, err)),
    }
}

async fn apply_inner<B: StorageBackend>(
    store: &RecordStore<B>,
    op: &BulkOperation,
) -> CoreResult<Applied> {
    let reverse = match op.kind() {
        OperationKind::Nothing => op.clone(),
        OperationKind::Insert | OperationKind::Update if op.is_restore() => {
            store.restore(op.record()).await?;
            op.clone()
        }
        OperationKind::Insert => {
            let id = op
                .stored_id()
                .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
            if let Err(err) = store.add_with_id(id.clone(), op.values().clone()).await {
                // The write may have landed before a later step failed.
                if store.try_find_by_id(&id).await.ok().flatten().is_none() {
                    return Err(err);
                }
                tracing::debug!(store = store.name(), id = %id, error = %err, "insert landed despite error");
            }
            return Ok(Applied {
                handle: Some(op.id().to_string()),
                reverse: BulkOperation::undo_insert(id),
            });
        }
        OperationKind::Delete if op.is_cancelled_insert() => op.clone(),
        OperationKind::Delete => {
            let prior = store.remove(op.id()).await?;
            BulkOperation::undo_with(OperationKind::Delete, prior)
        }
        OperationKind::Update => {
            let query = Query::by_id(op.id());
            let Some(prior) = store.try_find(&query).await? else {
                return Err(CoreError::not_found(format!("record {}", op.id())));
            };
            store.find_and_update(&query, op.values()).await?;
            BulkOperation::undo_with(OperationKind::Update, prior)
        }
    };
    Ok(Applied {
        handle: None,
        reverse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_codec::Value;
    use almanac_storage::{IndexDescriptor, InMemoryBackend, StoreSchema};
    use std::sync::Arc;

    fn store() -> RecordStore<InMemoryBackend> {
        let schema = StoreSchema::new("events").index(IndexDescriptor::new(["calendar_id"]));
        let backend = Arc::new(InMemoryBackend::open([schema]).unwrap());
        RecordStore::open(backend, "events").unwrap()
    }

    async fn seed(store: &RecordStore<InMemoryBackend>, id: &str, v: i64) -> Record {
        store
            .restore(Record::new(id, Fields::new().with("v", v)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn all_operations_commit() {
        let store = store();
        let a = seed(&store, "a", 1).await;
        let b = seed(&store, "b", 2).await;
        let c = seed(&store, "c", 3).await;

        let mut bulk = BulkTransaction::new([a, b, c], &store);
        bulk.update("a", Fields::new().with("v", 10)).unwrap();
        bulk.delete("b").unwrap();
        let pending = bulk.insert(Fields::new().with("v", 4)).unwrap();
        bulk.commit().await.unwrap();

        assert_eq!(bulk.state(), CommitState::Committed);
        assert_eq!(
            store.find_by_id("a").await.unwrap().get("v"),
            Some(&Value::from(10))
        );
        assert!(store.find_by_id("b").await.is_none());
        assert!(store.find_by_id("c").await.is_some());

        let stored_id = bulk.inserted_id(pending.id()).unwrap();
        assert_eq!(
            store.find_by_id(stored_id).await.unwrap().get("v"),
            Some(&Value::from(4))
        );
        assert_eq!(store.get_all().await.len(), 3);
    }

    #[tokio::test]
    async fn update_then_delete_is_a_delete() {
        let store = store();
        let a = seed(&store, "a", 1).await;

        let mut bulk = BulkTransaction::new([a], &store);
        bulk.update("a", Fields::new().with("v", 2)).unwrap();
        bulk.delete("a").unwrap();
        bulk.commit().await.unwrap();

        let op = bulk.operation("a").unwrap();
        assert_eq!(op.kind(), OperationKind::Delete);
        assert_eq!(op.old_kind(), OperationKind::Update);
        assert!(store.find_by_id("a").await.is_none());
    }

    #[tokio::test]
    async fn insert_then_update_is_one_insert() {
        let store = store();
        let mut bulk = BulkTransaction::new(Vec::new(), &store);
        let pending = bulk.insert(Fields::new().with("title", "draft")).unwrap();
        let latest = bulk
            .update(pending.id(), Fields::new().with("title", "final"))
            .unwrap();
        assert_eq!(latest.get("title"), Some(&Value::from("final")));
        assert_eq!(bulk.operations().len(), 1);
        assert_eq!(bulk.operations()[0].kind(), OperationKind::Insert);

        bulk.commit().await.unwrap();
        let all = store.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get("title"), Some(&Value::from("final")));
    }

    #[tokio::test]
    async fn cancelled_insert_writes_nothing() {
        let store = store();
        let mut bulk = BulkTransaction::new(Vec::new(), &store);
        let pending = bulk.insert(Fields::new().with("v", 1)).unwrap();
        bulk.delete(pending.id()).unwrap();
        bulk.commit().await.unwrap();
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_are_rejected() {
        let store = store();
        let a = seed(&store, "a", 1).await;
        let mut bulk = BulkTransaction::new([a], &store);

        assert!(matches!(
            bulk.update("zzz", Fields::new()),
            Err(CoreError::RegistryNotFound { .. })
        ));
        assert!(matches!(
            bulk.delete("zzz"),
            Err(CoreError::RegistryNotFound { .. })
        ));
        assert_eq!(bulk.operation("a").unwrap().kind(), OperationKind::Nothing);
    }

    #[tokio::test]
    async fn deleted_records_stay_in_the_working_set() {
        let store = store();
        let a = seed(&store, "a", 1).await;
        let b = seed(&store, "b", 2).await;
        let mut bulk = BulkTransaction::new([a, b], &store);

        bulk.update("a", Fields::new().with("v", 5)).unwrap();
        bulk.delete("a").unwrap();
        bulk.delete("a").unwrap();
        let op = bulk.operation("a").unwrap();
        assert_eq!(op.kind(), OperationKind::Delete);
        assert_eq!(op.old_kind(), OperationKind::Update);

        bulk.delete("b").unwrap();
        let revived = bulk.update("b", Fields::new().with("v", 7)).unwrap();
        assert_eq!(revived.get("v"), Some(&Value::from(7)));
        assert_eq!(bulk.operation("b").unwrap().kind(), OperationKind::Update);

        bulk.commit().await.unwrap();
        assert!(store.find_by_id("a").await.is_none());
        assert_eq!(
            store.find_by_id("b").await.unwrap().get("v"),
            Some(&Value::from(7))
        );
    }

    #[tokio::test]
    async fn repeated_delete_rolls_back_to_the_original() {
        let store = store();
        let a = seed(&store, "a", 1).await;
        let b = seed(&store, "b", 2).await;

        let mut bulk = BulkTransaction::new([a.clone(), b], &store);
        bulk.delete("a").unwrap();
        bulk.delete("a").unwrap();
        bulk.update("b", Fields::new().with("v", 20)).unwrap();
        store.remove("b").await.unwrap();

        let err = bulk.commit().await.unwrap_err();
        assert!(matches!(err, CoreError::RolledBack { failed: 1 }));
        assert_eq!(store.find_by_id("a").await, Some(a));
    }

    #[tokio::test]
    async fn committed_is_terminal() {
        let store = store();
        let mut bulk = BulkTransaction::new(Vec::new(), &store);
        bulk.commit().await.unwrap();

        assert!(matches!(bulk.commit().await, Err(CoreError::AlreadyCommitted)));
        assert!(matches!(bulk.retry().await, Err(CoreError::AlreadyCommitted)));
        assert!(matches!(bulk.rollback().await, Err(CoreError::AlreadyCommitted)));
        assert!(matches!(
            bulk.insert(Fields::new()),
            Err(CoreError::AlreadyCommitted)
        ));
    }

    #[tokio::test]
    async fn retry_and_rollback_need_the_right_state() {
        let store = store();
        let mut bulk = BulkTransaction::new(Vec::new(), &store);
        assert!(matches!(bulk.retry().await, Err(CoreError::CannotRetry { .. })));
        assert!(matches!(
            bulk.rollback().await,
            Err(CoreError::CannotRollback { .. })
        ));
        assert_eq!(bulk.state(), CommitState::NotStarted);
    }

    #[tokio::test]
    async fn missing_record_rolls_back_the_batch() {
        let store = store();
        let a = seed(&store, "a", 1).await;
        let b = seed(&store, "b", 2).await;

        let mut bulk = BulkTransaction::new([a.clone(), b], &store);
        bulk.update("a", Fields::new().with("v", 10).with("extra", true))
            .unwrap();
        bulk.update("b", Fields::new().with("v", 20)).unwrap();
        let pending = bulk.insert(Fields::new().with("v", 3)).unwrap();

        // The existence check fails for b on both attempts.
        store.remove("b").await.unwrap();

        let err = bulk.commit().await.unwrap_err();
        assert!(matches!(err, CoreError::RolledBack { failed: 1 }));
        assert_eq!(bulk.state(), CommitState::RolledBack);
        assert_eq!(bulk.pending().len(), 1);
        assert!(bulk.inserted_id(pending.id()).is_none());

        assert_eq!(store.find_by_id("a").await, Some(a));
        assert_eq!(store.get_all().await.len(), 1);
        assert!(matches!(
            bulk.commit().await,
            Err(CoreError::CannotRetry { .. })
        ));
    }
}
