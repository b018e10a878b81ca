//! Storage backend and transaction trait definitions.

use crate::cursor::{Cursor, ScanRange};
use crate::error::StorageResult;
use crate::schema::StoreSchema;
use almanac_codec::{IndexKey, Record};
use std::future::Future;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only; shares the object store with other readers.
    ReadOnly,
    /// Reads and writes; exclusive over the object store until it ends.
    ReadWrite,
}

/// An asynchronous transactional object store.
///
/// A backend holds any number of named object stores, each keyed by the
/// record `id` and carrying the secondary indexes of its [`StoreSchema`].
/// All access goes through transactions scoped to a single object store.
///
/// # Invariants
///
/// - Read-write transactions on one object store are serialized
/// - A transaction that is dropped without [`StoreTransaction::commit`]
///   leaves no trace of its writes
/// - The schema of an object store never changes while the backend is open
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing and ephemeral data
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// The transaction type handed out by this backend.
    type Transaction: StoreTransaction;

    /// Returns the schema of an object store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::StoreNotFound`] if no such store exists.
    fn schema(&self, store: &str) -> StorageResult<StoreSchema>;

    /// Returns the names of all object stores, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Opens a transaction over one object store.
    ///
    /// Waits until the requested access is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the store does not exist or the backend cannot
    /// start a transaction.
    fn transaction(
        &self,
        store: &str,
        mode: TransactionMode,
    ) -> impl Future<Output = StorageResult<Self::Transaction>> + Send;
}

/// A transaction over a single object store.
///
/// Each request reports its own outcome. The transaction as a whole only
/// succeeds once [`StoreTransaction::commit`] returns `Ok`.
pub trait StoreTransaction: Send + Sync + Sized {
    /// Returns the object store this transaction is scoped to.
    fn store(&self) -> &str;

    /// Returns the access mode.
    fn mode(&self) -> TransactionMode;

    /// Reads a record by primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn get(&self, id: &str) -> impl Future<Output = StorageResult<Option<Record>>> + Send;

    /// Reads every record whose key on `index` equals `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::IndexNotFound`] for an unknown index.
    fn get_by_index(
        &self,
        index: &str,
        key: &IndexKey,
    ) -> impl Future<Output = StorageResult<Vec<Record>>> + Send;

    /// Counts the records in the object store.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn count(&self) -> impl Future<Output = StorageResult<usize>> + Send;

    /// Opens a cursor over `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range names an unknown index.
    fn open_cursor(
        &self,
        range: &ScanRange,
    ) -> impl Future<Output = StorageResult<Cursor>> + Send;

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::KeyExists`] if the id is taken,
    /// [`crate::StorageError::ConstraintViolation`] on a unique index clash,
    /// or [`crate::StorageError::ReadOnly`] in a read-only transaction.
    fn add(&mut self, record: Record) -> impl Future<Output = StorageResult<()>> + Send;

    /// Inserts or replaces a record, returning the previous version.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ConstraintViolation`] on a unique index
    /// clash or [`crate::StorageError::ReadOnly`] in a read-only transaction.
    fn put(&mut self, record: Record)
        -> impl Future<Output = StorageResult<Option<Record>>> + Send;

    /// Deletes a record by primary key, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadOnly`] in a read-only transaction.
    fn delete(&mut self, id: &str) -> impl Future<Output = StorageResult<Option<Record>>> + Send;

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the writes could not be made durable; they are
    /// rolled back in that case.
    fn commit(self) -> impl Future<Output = StorageResult<()>> + Send;

    /// Aborts the transaction, discarding its writes.
    fn abort(self) {
        drop(self);
    }
}
