//! File-based storage backend.

use crate::backend::{StorageBackend, StoreTransaction, TransactionMode};
use crate::cursor::{Cursor, ScanRange};
use crate::error::{StorageError, StorageResult};
use crate::memory::{InMemoryBackend, MemoryTransaction};
use crate::schema::StoreSchema;
use crate::table::Table;
use almanac_codec::{from_cbor, to_cbor, IndexKey, Record};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Version of the persisted store document.
const FORMAT_VERSION: i64 = 1;

/// Extension of persisted object store files.
const STORE_EXTENSION: &str = "store";

/// Name of the lock file guarding a database directory.
const LOCK_FILE: &str = "LOCK";

/// A file-based storage backend.
///
/// Each object store lives in `<dir>/<store>.store`, a CBOR document holding
/// the store schema and its records. Reads are served from memory; every
/// read-write transaction that changed something rewrites its file before it
/// reports success. The rewrite goes through a temporary file and a rename,
/// so a crash leaves either the old or the new contents.
///
/// # Locking
///
/// The directory is locked exclusively while the backend is open; a second
/// handle on the same directory fails with [`StorageError::Locked`].
///
/// # Schema changes
///
/// Opening with a schema that differs from the stored one rebuilds every
/// index from the stored records and rewrites the file. Stores found on disk
/// but not passed to [`FileBackend::open`] are loaded with their stored
/// schema.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    memory: InMemoryBackend,
    lock: File,
}

impl FileBackend {
    /// Opens or creates a database directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created or read
    /// - Another handle holds the directory lock
    /// - A store file is corrupted
    /// - Records violate a unique index of a changed schema
    pub fn open(
        dir: impl AsRef<Path>,
        schemas: impl IntoIterator<Item = StoreSchema>,
    ) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| StorageError::Locked { path: lock_path })?;

        let mut stored = load_dir(&dir)?;
        let memory = InMemoryBackend::new();

        for schema in schemas {
            schema.validate()?;
            let name = schema.name().to_string();
            match stored.remove(&name) {
                Some((stored_schema, records)) if stored_schema == schema => {
                    memory.install(Table::from_records(schema, records)?);
                }
                Some((_, records)) => {
                    tracing::info!(
                        store = %name,
                        records = records.len(),
                        "rebuilding indexes for changed schema"
                    );
                    let table = Table::from_records(schema, records)?;
                    persist(&store_path(&dir, &name), &table)?;
                    memory.install(table);
                }
                None => {
                    let table = Table::new(schema);
                    persist(&store_path(&dir, &name), &table)?;
                    memory.install(table);
                }
            }
        }

        for (schema, records) in stored.into_values() {
            memory.install(Table::from_records(schema, records)?);
        }

        tracing::debug!(
            dir = %dir.display(),
            stores = memory.store_names().len(),
            "opened file backend"
        );
        Ok(Self {
            dir,
            memory,
            lock,
        })
    }

    /// Returns the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.lock) {
            tracing::warn!(dir = %self.dir.display(), error = %err, "failed to release directory lock");
        }
    }
}

impl StorageBackend for FileBackend {
    type Transaction = FileTransaction;

    fn schema(&self, store: &str) -> StorageResult<StoreSchema> {
        self.memory.schema(store)
    }

    fn store_names(&self) -> Vec<String> {
        self.memory.store_names()
    }

    async fn transaction(
        &self,
        store: &str,
        mode: TransactionMode,
    ) -> StorageResult<FileTransaction> {
        let inner = self.memory.transaction(store, mode).await?;
        Ok(FileTransaction {
            inner,
            path: store_path(&self.dir, store),
        })
    }
}

/// A transaction over a [`FileBackend`] object store.
#[derive(Debug)]
pub struct FileTransaction {
    inner: MemoryTransaction,
    path: PathBuf,
}

impl StoreTransaction for FileTransaction {
    fn store(&self) -> &str {
        self.inner.store()
    }

    fn mode(&self) -> TransactionMode {
        self.inner.mode()
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Record>> {
        self.inner.get(id).await
    }

    async fn get_by_index(&self, index: &str, key: &IndexKey) -> StorageResult<Vec<Record>> {
        self.inner.get_by_index(index, key).await
    }

    async fn count(&self) -> StorageResult<usize> {
        self.inner.count().await
    }

    async fn open_cursor(&self, range: &ScanRange) -> StorageResult<Cursor> {
        self.inner.open_cursor(range).await
    }

    async fn add(&mut self, record: Record) -> StorageResult<()> {
        self.inner.add(record).await
    }

    async fn put(&mut self, record: Record) -> StorageResult<Option<Record>> {
        self.inner.put(record).await
    }

    async fn delete(&mut self, id: &str) -> StorageResult<Option<Record>> {
        self.inner.delete(id).await
    }

    async fn commit(self) -> StorageResult<()> {
        // On a failed write `self` is dropped and the in-memory writes undone.
        if self.inner.is_dirty() {
            let bytes = encode(self.inner.table())?;
            let path = self.path.clone();
            tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
                .await
                .map_err(|err| StorageError::Io(io::Error::other(err)))??;
        }
        self.inner.commit().await
    }
}

fn store_path(dir: &Path, store: &str) -> PathBuf {
    dir.join(format!("{store}.{STORE_EXTENSION}"))
}

/// Writes a table atomically.
fn persist(path: &Path, table: &Table) -> StorageResult<()> {
    write_atomic(path, &encode(table)?)
}

fn encode(table: &Table) -> StorageResult<Vec<u8>> {
    Ok(to_cbor(&table.to_value(FORMAT_VERSION))?)
}

/// Temporary file, fsync, rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let tmp = path.with_extension(format!("{STORE_EXTENSION}.tmp"));
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads every store file in `dir`, keyed by store name.
fn load_dir(dir: &Path) -> StorageResult<BTreeMap<String, (StoreSchema, Vec<Record>)>> {
    let mut stores = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXTENSION) {
            continue;
        }
        let bytes = fs::read(&path)?;
        let (format, schema, records) = Table::decode(from_cbor(&bytes)?)?;
        if format != FORMAT_VERSION {
            return Err(StorageError::Corrupted(format!(
                "{}: unsupported format version {format}",
                path.display()
            )));
        }
        let file_stem = path.file_stem().and_then(|s| s.to_str());
        if file_stem != Some(schema.name()) {
            return Err(StorageError::Corrupted(format!(
                "{}: holds object store {}",
                path.display(),
                schema.name()
            )));
        }
        stores.insert(schema.name().to_string(), (schema, records));
    }
    Ok(stores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexDescriptor;
    use almanac_codec::{Fields, KeyPart};
    use tempfile::tempdir;

    fn schema() -> StoreSchema {
        StoreSchema::new("events").index(IndexDescriptor::new(["calendar_id"]))
    }

    fn event(id: &str, calendar: &str) -> Record {
        Record::new(id, Fields::new().with("calendar_id", calendar))
    }

    async fn insert(backend: &FileBackend, record: Record) {
        let mut txn = backend
            .transaction("events", TransactionMode::ReadWrite)
            .await
            .unwrap();
        txn.add(record).await.unwrap();
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path(), [schema()]).unwrap();
            insert(&backend, event("a", "c1")).await;
            insert(&backend, event("b", "c2")).await;
        }

        let backend = FileBackend::open(dir.path(), [schema()]).unwrap();
        let txn = backend
            .transaction("events", TransactionMode::ReadOnly)
            .await
            .unwrap();
        assert_eq!(txn.count().await.unwrap(), 2);
        let key = IndexKey::new(vec![KeyPart::Text("c2".into())]);
        let hits = txn.get_by_index("calendar_id", &key).await.unwrap();
        assert_eq!(hits, vec![event("b", "c2")]);
    }

    #[tokio::test]
    async fn uncommitted_writes_are_not_persisted() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path(), [schema()]).unwrap();
            let mut txn = backend
                .transaction("events", TransactionMode::ReadWrite)
                .await
                .unwrap();
            txn.add(event("a", "c1")).await.unwrap();
            txn.abort();
        }

        let backend = FileBackend::open(dir.path(), [schema()]).unwrap();
        let txn = backend
            .transaction("events", TransactionMode::ReadOnly)
            .await
            .unwrap();
        assert_eq!(txn.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_commits_all_reach_disk() {
        let dir = tempdir().unwrap();
        {
            let backend = std::sync::Arc::new(FileBackend::open(dir.path(), [schema()]).unwrap());
            let writers: Vec<_> = (0..8)
                .map(|i| {
                    let backend = std::sync::Arc::clone(&backend);
                    tokio::spawn(async move {
                        insert(&backend, event(&format!("e{i}"), "c1")).await;
                    })
                })
                .collect();
            for writer in writers {
                writer.await.unwrap();
            }
        }

        let backend = FileBackend::open(dir.path(), [schema()]).unwrap();
        let txn = backend
            .transaction("events", TransactionMode::ReadOnly)
            .await
            .unwrap();
        assert_eq!(txn.count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn failed_write_undoes_the_transaction() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("db");
        let backend = FileBackend::open(&db, [schema()]).unwrap();
        fs::remove_dir_all(&db).unwrap();

        let mut txn = backend
            .transaction("events", TransactionMode::ReadWrite)
            .await
            .unwrap();
        txn.add(event("a", "c1")).await.unwrap();
        assert!(matches!(txn.commit().await, Err(StorageError::Io(_))));

        let txn = backend
            .transaction("events", TransactionMode::ReadOnly)
            .await
            .unwrap();
        assert_eq!(txn.count().await.unwrap(), 0);
    }

    #[test]
    fn second_handle_is_locked_out() {
        let dir = tempdir().unwrap();
        let _first = FileBackend::open(dir.path(), [schema()]).unwrap();
        let err = FileBackend::open(dir.path(), [schema()]).unwrap_err();
        assert!(matches!(err, StorageError::Locked { .. }));
    }

    #[tokio::test]
    async fn changed_schema_rebuilds_indexes() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path(), [StoreSchema::new("events")]).unwrap();
            insert(&backend, event("a", "c1")).await;
        }

        let backend = FileBackend::open(dir.path(), [schema()]).unwrap();
        assert_eq!(backend.schema("events").unwrap(), schema());
        let txn = backend
            .transaction("events", TransactionMode::ReadOnly)
            .await
            .unwrap();
        let key = IndexKey::new(vec![KeyPart::Text("c1".into())]);
        assert_eq!(txn.get_by_index("calendar_id", &key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stores_on_disk_load_without_schema() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path(), [schema()]).unwrap();
            insert(&backend, event("a", "c1")).await;
        }

        let backend = FileBackend::open(dir.path(), []).unwrap();
        assert_eq!(backend.store_names(), ["events"]);
        assert_eq!(backend.schema("events").unwrap(), schema());
    }

    #[test]
    fn corrupted_store_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("events.store"), b"\xff\x00garbage").unwrap();
        assert!(FileBackend::open(dir.path(), []).is_err());
    }
}
