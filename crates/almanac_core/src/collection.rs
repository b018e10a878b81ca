//! Typed record store access.

use crate::error::CoreResult;
use crate::query::Query;
use crate::store::RecordStore;
use almanac_codec::{from_record, to_fields, Fields, Record};
use almanac_storage::StorageBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// A typed view over a [`RecordStore`].
///
/// `T` is any serde type that serializes as a map and carries an
/// `id: String` field. Values are converted through the codec's serde
/// bridge; the `id` of a value passed to [`add`](Self::add) is ignored and
/// replaced with a generated one.
///
/// # Example
///
/// ```rust
/// use almanac_core::{Collection, Query, RecordStore};
/// use almanac_storage::{InMemoryBackend, StoreSchema};
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Task {
///     id: String,
///     title: String,
///     done: bool,
/// }
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = Arc::new(InMemoryBackend::open([StoreSchema::new("tasks")]).unwrap());
/// let tasks: Collection<Task, _> = Collection::new(RecordStore::open(backend, "tasks").unwrap());
///
/// let task = tasks
///     .add(&Task { id: String::new(), title: "Write report".into(), done: false })
///     .await
///     .unwrap();
/// assert_eq!(tasks.find(&Query::all().eq("done", false)).await.unwrap(), Some(task));
/// # });
/// ```
pub struct Collection<T, B: StorageBackend> {
    store: RecordStore<B>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, B> Collection<T, B>
where
    T: Serialize + DeserializeOwned,
    B: StorageBackend,
{
    /// Wraps a record store.
    pub fn new(store: RecordStore<B>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying record store.
    #[must_use]
    pub fn store(&self) -> &RecordStore<B> {
        &self.store
    }

    /// Adds a value under a generated id and returns the stored value.
    ///
    /// # Errors
    ///
    /// Returns a codec error if `value` is not a map, or the
    /// [`RecordStore::add`] error.
    pub async fn add(&self, value: &T) -> CoreResult<T> {
        let fields = to_fields(value)?.without_id();
        let record = self.store.add(fields).await?;
        Ok(from_record(&record)?)
    }

    /// Looks up a value by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails or the record does not decode.
    pub async fn find_by_id(&self, id: &str) -> CoreResult<Option<T>> {
        self.store
            .try_find_by_id(id)
            .await?
            .map(|record| decode(&record))
            .transpose()
    }

    /// Returns the first value matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails or the record does not decode.
    pub async fn find(&self, query: &Query) -> CoreResult<Option<T>> {
        self.store
            .try_find(query)
            .await?
            .map(|record| decode(&record))
            .transpose()
    }

    /// Returns every value matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails or a record does not decode.
    pub async fn find_all(&self, query: &Query) -> CoreResult<Vec<T>> {
        decode_all(&self.store.try_find_all(query).await?)
    }

    /// Returns every value.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails or a record does not decode.
    pub async fn get_all(&self) -> CoreResult<Vec<T>> {
        decode_all(&self.store.try_get_all().await?)
    }

    /// Removes a value by id, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] if no value has this id.
    pub async fn remove(&self, id: &str) -> CoreResult<T> {
        decode(&self.store.remove(id).await?)
    }

    /// Removes every value matching `query`, returning them.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] if nothing matched.
    pub async fn remove_all(&self, query: &Query) -> CoreResult<Vec<T>> {
        decode_all(&self.store.remove_all(query).await?)
    }

    /// Merges `update` over every value matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotFound`] if nothing matched.
    pub async fn find_and_update(&self, query: &Query, update: &Fields) -> CoreResult<Vec<T>> {
        decode_all(&self.store.find_and_update(query, update).await?)
    }
}

fn decode<T: DeserializeOwned>(record: &Record) -> CoreResult<T> {
    Ok(from_record(record)?)
}

fn decode_all<T: DeserializeOwned>(records: &[Record]) -> CoreResult<Vec<T>> {
    records.iter().map(decode).collect()
}
