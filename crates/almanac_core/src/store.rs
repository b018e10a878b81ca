//! The record store: CRUD and partial-match queries over one object store.

use crate::change_feed::{ChangeFeed, ChangeKind, ListenerId, StoreEvent};
use crate::config::Config;
use crate::effects::{with_side_effects, Effect, EffectSinks, RefreshSignal};
use crate::error::{CoreError, CoreResult};
use crate::planner::{Access, IndexRegistry, QueryPlan};
use crate::query::Query;
use almanac_codec::{Fields, Record};
use almanac_storage::{ScanRange, StorageBackend, StoreTransaction, TransactionMode};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use uuid::Uuid;

/// Durable, queryable storage for one collection of records.
///
/// Every operation opens its own backend transaction, read-only for lookups
/// and read-write for mutations, and only reports success once both the
/// request and the transaction commit succeeded. Mutations bump the
/// [`RefreshSignal`] whatever their outcome and publish a [`StoreEvent`]
/// when they succeed.
///
/// Handles are cheap to clone and share the backend, the change feed and
/// the refresh signal.
///
/// # Example
///
/// ```rust
/// use almanac_codec::Fields;
/// use almanac_core::{Query, RecordStore};
/// use almanac_storage::{IndexDescriptor, InMemoryBackend, StoreSchema};
/// use std::sync::Arc;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let schema = StoreSchema::new("events").index(IndexDescriptor::new(["calendar_id"]));
/// let backend = Arc::new(InMemoryBackend::open([schema]).unwrap());
/// let events = RecordStore::open(backend, "events").unwrap();
///
/// let added = events
///     .add(Fields::new().with("calendar_id", "c1").with("title", "Standup"))
///     .await
///     .unwrap();
/// let found = events.find(&Query::all().eq("calendar_id", "c1")).await;
/// assert_eq!(found, Some(added));
/// # });
/// ```
pub struct RecordStore<B: StorageBackend> {
    backend: Arc<B>,
    name: String,
    registry: IndexRegistry,
    feed: Arc<ChangeFeed>,
    refresh: Arc<RefreshSignal>,
    config: Config,
}

impl<B: StorageBackend> Clone for RecordStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            name: self.name.clone(),
            registry: self.registry.clone(),
            feed: Arc::clone(&self.feed),
            refresh: Arc::clone(&self.refresh),
            config: self.config.clone(),
        }
    }
}

impl<B: StorageBackend> std::fmt::Debug for RecordStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("name", &self.name)
            .field("indexes", &self.registry.descriptors().len())
            .field("config", &self.config)
            .finish()
    }
}

impl<B: StorageBackend> RecordStore<B> {
    /// Opens a record store over an existing object store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend has no object store named `name`.
    pub fn open(backend: Arc<B>, name: impl Into<String>) -> CoreResult<Self> {
        Self::with_config(backend, name, Config::default())
    }

    /// Opens a record store with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend has no object store named `name`.
    pub fn with_config(backend: Arc<B>, name: impl Into<String>, config: Config) -> CoreResult<Self> {
        let name = name.into();
        let schema = backend.schema(&name)?;
        let registry = IndexRegistry::new(schema.indexes());
        tracing::debug!(store = %name, indexes = schema.indexes().len(), "opened record store");
        Ok(Self {
            backend,
            name,
            registry,
            feed: Arc::new(ChangeFeed::with_max_history(config.max_history)),
            refresh: Arc::new(RefreshSignal::new()),
            config,
        })
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the index registry used for planning.
    #[must_use]
    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Returns the change feed.
    #[must_use]
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Returns the refresh signal.
    #[must_use]
    pub fn refresh(&self) -> &RefreshSignal {
        &self.refresh
    }

    /// Subscribes to change events on a channel.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.feed.subscribe()
    }

    /// Registers a callback for change events.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.feed.listen(listener)
    }

    /// Registers a callback for the "data changed" signal.
    pub fn on_refresh<F>(&self, listener: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.refresh.listen(listener);
    }

    /// Returns the plan the store would use for `query`.
    #[must_use]
    pub fn explain(&self, query: &Query) -> QueryPlan {
        self.registry.plan(query)
    }

    fn sinks(&self) -> EffectSinks<'_> {
        EffectSinks {
            store: &self.name,
            refresh: &self.refresh,
            feed: &self.feed,
        }
    }

    async fn begin(&self, mode: TransactionMode) -> CoreResult<B::Transaction> {
        Ok(self.backend.transaction(&self.name, mode).await?)
    }

    /// Adds a record under a freshly generated id.
    ///
    /// An `id` entry in `fields` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CouldNotCreate`] if the record cannot be read
    /// back after the insert, or [`CoreError::Transaction`].
    pub async fn add(&self, fields: Fields) -> CoreResult<Record> {
        self.add_with_id(Uuid::new_v4().to_string(), fields).await
    }

    /// Adds a record under an id chosen by the caller.
    pub(crate) async fn add_with_id(&self, id: String, fields: Fields) -> CoreResult<Record> {
        with_side_effects(
            self.sinks(),
            &[Effect::NotifyChanged, Effect::Emit(ChangeKind::Add)],
            self.add_record(id, fields),
        )
        .await
    }

    async fn add_record(&self, id: String, fields: Fields) -> CoreResult<Record> {
        let record = Record::new(id.clone(), fields);

        let mut txn = self.begin(TransactionMode::ReadWrite).await?;
        txn.add(record).await?;
        txn.commit().await?;

        match self.try_find_by_id(&id).await? {
            Some(stored) => Ok(stored),
            None => Err(CoreError::CouldNotCreate { id }),
        }
    }

    /// Looks up a record by id, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`] if the lookup failed.
    pub async fn try_find_by_id(&self, id: &str) -> CoreResult<Option<Record>> {
        let txn = self.begin(TransactionMode::ReadOnly).await?;
        let found = txn.get(id).await?;
        txn.commit().await?;
        Ok(found)
    }

    /// Looks up a record by id.
    ///
    /// Failures are logged and reported as absence.
    pub async fn find_by_id(&self, id: &str) -> Option<Record> {
        self.try_find_by_id(id).await.unwrap_or_else(|err| {
            tracing::warn!(store = %self.name, id, error = %err, "findById failed");
            None
        })
    }

    /// Returns the first record matching `query`, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`] if the scan failed.
    pub async fn try_find(&self, query: &Query) -> CoreResult<Option<Record>> {
        let txn = self.begin(TransactionMode::ReadOnly).await?;
        let found = self.scan(&txn, query, true).await?;
        txn.commit().await?;
        Ok(found.into_iter().next())
    }

    /// Returns the first record matching `query`.
    ///
    /// Failures are logged and reported as absence.
    pub async fn find(&self, query: &Query) -> Option<Record> {
        self.try_find(query).await.unwrap_or_else(|err| {
            tracing::warn!(store = %self.name, error = %err, "find failed");
            None
        })
    }

    /// Deletes a record by id, returning its prior value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no record has this id.
    pub async fn remove(&self, id: &str) -> CoreResult<Record> {
        with_side_effects(
            self.sinks(),
            &[Effect::NotifyChanged, Effect::Emit(ChangeKind::Remove)],
            self.remove_record(id),
        )
        .await
    }

    async fn remove_record(&self, id: &str) -> CoreResult<Record> {
        let mut txn = self.begin(TransactionMode::ReadWrite).await?;
        let Some(prior) = txn.delete(id).await? else {
            return Err(CoreError::not_found(format!("record {id}")));
        };
        txn.commit().await?;
        Ok(prior)
    }

    /// Deletes every record matching `query`, returning them.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if nothing matched.
    pub async fn remove_all(&self, query: &Query) -> CoreResult<Vec<Record>> {
        with_side_effects(
            self.sinks(),
            &[Effect::NotifyChanged, Effect::Emit(ChangeKind::RemoveAll)],
            self.remove_matching(query),
        )
        .await
    }

    async fn remove_matching(&self, query: &Query) -> CoreResult<Vec<Record>> {
        let mut txn = self.begin(TransactionMode::ReadWrite).await?;
        let matches = self.scan(&txn, query, false).await?;
        if matches.is_empty() {
            return Err(CoreError::not_found(format!("records matching {query:?}")));
        }
        for record in &matches {
            txn.delete(record.id()).await?;
        }
        txn.commit().await?;
        Ok(matches)
    }

    /// Merges `update` over every record matching `query` and persists them.
    ///
    /// Returns the updated records. The id of a record never changes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if nothing matched.
    pub async fn find_and_update(&self, query: &Query, update: &Fields) -> CoreResult<Vec<Record>> {
        with_side_effects(
            self.sinks(),
            &[Effect::NotifyChanged, Effect::Emit(ChangeKind::Update)],
            self.update_matching(query, update),
        )
        .await
    }

    async fn update_matching(&self, query: &Query, update: &Fields) -> CoreResult<Vec<Record>> {
        let mut txn = self.begin(TransactionMode::ReadWrite).await?;
        let matches = self.scan(&txn, query, false).await?;
        if matches.is_empty() {
            return Err(CoreError::not_found(format!("records matching {query:?}")));
        }
        let mut updated = Vec::with_capacity(matches.len());
        for record in matches {
            let next = record.merged(update);
            txn.put(next.clone()).await?;
            updated.push(next);
        }
        txn.commit().await?;
        Ok(updated)
    }

    /// Writes a record under its own id, inserting or replacing it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`] if the write failed.
    pub async fn restore(&self, record: Record) -> CoreResult<Record> {
        with_side_effects(
            self.sinks(),
            &[Effect::NotifyChanged, Effect::Emit(ChangeKind::Restore)],
            self.put_record(record),
        )
        .await
    }

    async fn put_record(&self, record: Record) -> CoreResult<Record> {
        let mut txn = self.begin(TransactionMode::ReadWrite).await?;
        txn.put(record.clone()).await?;
        txn.commit().await?;
        Ok(record)
    }

    /// Returns every record, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`] if the scan failed.
    pub async fn try_get_all(&self) -> CoreResult<Vec<Record>> {
        self.try_find_all(&Query::all()).await
    }

    /// Returns every record.
    ///
    /// Failures are logged and reported as an empty list.
    pub async fn get_all(&self) -> Vec<Record> {
        self.try_get_all().await.unwrap_or_else(|err| {
            tracing::warn!(store = %self.name, error = %err, "getAll failed; returning no records");
            Vec::new()
        })
    }

    /// Returns every record matching `query`, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`] if the scan failed.
    pub async fn try_find_all(&self, query: &Query) -> CoreResult<Vec<Record>> {
        let txn = self.begin(TransactionMode::ReadOnly).await?;
        let matches = self.scan(&txn, query, false).await?;
        txn.commit().await?;
        Ok(matches)
    }

    /// Returns every record matching `query`.
    ///
    /// Failures are logged and reported as an empty list.
    pub async fn find_all(&self, query: &Query) -> Vec<Record> {
        self.try_find_all(query).await.unwrap_or_else(|err| {
            tracing::warn!(store = %self.name, error = %err, "findAll failed; returning no records");
            Vec::new()
        })
    }

    /// Returns the number of records.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transaction`] if the count failed.
    pub async fn count(&self) -> CoreResult<usize> {
        let txn = self.begin(TransactionMode::ReadOnly).await?;
        let count = txn.count().await?;
        txn.commit().await?;
        Ok(count)
    }

    /// Runs the planned scan for `query` inside `txn`.
    ///
    /// With `first_only` the scan stops at the first match.
    async fn scan(
        &self,
        txn: &B::Transaction,
        query: &Query,
        first_only: bool,
    ) -> CoreResult<Vec<Record>> {
        let plan = self.registry.plan(query);
        tracing::debug!(store = %self.name, %plan, "planned query");
        let residual = plan.residual();

        let mut cursor = match plan.access() {
            Access::PrimaryKey(id) => {
                let found = txn.get(id).await?;
                return Ok(found
                    .into_iter()
                    .filter(|record| query.matches_on(record, residual))
                    .collect());
            }
            Access::Index { name, key } if residual.is_empty() => {
                let mut hits = txn.get_by_index(name, key).await?;
                if first_only {
                    hits.truncate(1);
                }
                return Ok(hits);
            }
            Access::Index { name, key } => {
                txn.open_cursor(&ScanRange::index(name.clone(), key.clone()))
                    .await?
            }
            Access::FullScan => txn.open_cursor(&ScanRange::All).await?,
        };

        let mut matches = Vec::new();
        while let Some(record) = cursor.advance() {
            if query.matches_on(&record, residual) {
                matches.push(record);
                if first_only {
                    cursor.stop();
                }
            }
        }

        if plan.is_full_scan() && cursor.visited() > self.config.scan_warning_threshold {
            tracing::warn!(
                store = %self.name,
                visited = cursor.visited(),
                query = ?query,
                "full scan over a large store; consider adding an index"
            );
        }
        Ok(matches)
    }
}
