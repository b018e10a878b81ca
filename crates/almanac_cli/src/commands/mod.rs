//! CLI command implementations.

pub mod create;
pub mod explain;
pub mod find;
pub mod inspect;
pub mod json;
pub mod write;

use almanac_core::RecordStore;
use almanac_storage::{FileBackend, StoreSchema};
use std::path::Path;
use std::sync::Arc;

/// Opens the database at `path` with the schemas stored on disk.
pub fn open_backend(path: &Path) -> Result<Arc<FileBackend>, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!(
            "No database found at {:?}; define a store with `almanac create` first",
            path
        )
        .into());
    }
    Ok(Arc::new(FileBackend::open(path, Vec::<StoreSchema>::new())?))
}

/// Opens one object store of the database at `path`.
pub fn open_store(
    path: &Path,
    store: &str,
) -> Result<RecordStore<FileBackend>, Box<dyn std::error::Error>> {
    Ok(RecordStore::open(open_backend(path)?, store)?)
}
