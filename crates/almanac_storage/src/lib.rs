//! # Almanac Storage
//!
//! Asynchronous transactional object stores for Almanac.
//!
//! This crate provides the storage the record stores run on: named object
//! stores keyed by record `id`, each with secondary composite indexes, and
//! accessed only through transactions scoped to one object store.
//!
//! ## Design Principles
//!
//! - Every request happens inside a read-only or read-write transaction
//! - Read-write transactions on one object store are serialized
//! - Uncommitted writes are undone when a transaction is dropped
//! - Backends know about records and index keys, not about queries
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - For persistent storage, one CBOR file per object store
//!
//! ## Example
//!
//! ```rust
//! use almanac_codec::{Fields, Record};
//! use almanac_storage::{
//!     IndexDescriptor, InMemoryBackend, StorageBackend, StoreSchema, StoreTransaction,
//!     TransactionMode,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let schema = StoreSchema::new("events").index(IndexDescriptor::new(["calendar_id"]));
//! let backend = InMemoryBackend::open([schema]).unwrap();
//!
//! let mut txn = backend.transaction("events", TransactionMode::ReadWrite).await.unwrap();
//! txn.put(Record::new("e1", Fields::new().with("calendar_id", "c1"))).await.unwrap();
//! txn.commit().await.unwrap();
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cursor;
mod error;
mod file;
mod memory;
mod schema;
mod table;

pub use backend::{StorageBackend, StoreTransaction, TransactionMode};
pub use cursor::{Cursor, ScanRange};
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, FileTransaction};
pub use memory::{InMemoryBackend, MemoryTransaction};
pub use schema::{IndexDescriptor, IndexOptions, StoreSchema};
