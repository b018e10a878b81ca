//! Test fixtures and store helpers.
//!
//! Provides the calendar schemas used across the test suites and
//! convenience constructors for record stores over each backend.

use almanac_codec::Fields;
use almanac_core::{Config, RecordStore};
use almanac_storage::{FileBackend, IndexDescriptor, InMemoryBackend, StoreSchema};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::faults::FlakyBackend;

/// Name of the events object store.
pub const EVENTS: &str = "events";

/// Name of the tasks object store.
pub const TASKS: &str = "tasks";

/// Events, indexed by calendar and by calendar and start date.
pub fn events_schema() -> StoreSchema {
    StoreSchema::new(EVENTS)
        .index(IndexDescriptor::new(["calendar_id"]))
        .index(IndexDescriptor::new(["calendar_id", "startDate"]))
}

/// Tasks, indexed by completion flag.
pub fn tasks_schema() -> StoreSchema {
    StoreSchema::new(TASKS).index(IndexDescriptor::new(["done"]))
}

/// Every calendar object store.
pub fn calendar_schemas() -> Vec<StoreSchema> {
    vec![events_schema(), tasks_schema()]
}

/// Fields of a calendar event.
pub fn event(calendar_id: &str, start_date: i64, title: &str) -> Fields {
    Fields::new()
        .with("calendar_id", calendar_id)
        .with("startDate", start_date)
        .with("title", title)
}

/// Fields of a task.
pub fn task(title: &str, done: bool) -> Fields {
    Fields::new().with("title", title).with("done", done)
}

/// Test config with a zero retry delay.
pub fn fast_config() -> Config {
    Config::default().retry_delay(Duration::ZERO)
}

/// An events store over a fresh in-memory backend.
pub fn memory_events() -> RecordStore<InMemoryBackend> {
    let backend = InMemoryBackend::open(calendar_schemas()).expect("Failed to open backend");
    RecordStore::with_config(Arc::new(backend), EVENTS, fast_config())
        .expect("Failed to open events store")
}

/// An events store over a fresh fault-injecting backend.
///
/// The backend handle is returned so tests can arm faults.
pub fn flaky_events() -> (Arc<FlakyBackend>, RecordStore<FlakyBackend>) {
    let backend =
        Arc::new(FlakyBackend::open(calendar_schemas()).expect("Failed to open backend"));
    let store = RecordStore::with_config(Arc::clone(&backend), EVENTS, fast_config())
        .expect("Failed to open events store");
    (backend, store)
}

/// A file-backed database in a temporary directory.
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    /// Creates an empty temporary directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Opens the calendar backend in this directory.
    pub fn open(&self) -> Arc<FileBackend> {
        Arc::new(
            FileBackend::open(self.path(), calendar_schemas())
                .expect("Failed to open file backend"),
        )
    }

    /// Opens the events store in this directory.
    pub fn events(&self) -> RecordStore<FileBackend> {
        RecordStore::with_config(self.open(), EVENTS, fast_config())
            .expect("Failed to open events store")
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
