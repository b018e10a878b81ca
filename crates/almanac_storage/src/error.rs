//! Error types for storage operations.

use almanac_codec::CodecError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted store file could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A persisted store file is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The named object store does not exist.
    #[error("object store not found: {name}")]
    StoreNotFound {
        /// Name of the object store.
        name: String,
    },

    /// The named index does not exist on the object store.
    #[error("index {index} not found on object store {store}")]
    IndexNotFound {
        /// Name of the object store.
        store: String,
        /// Name of the index.
        index: String,
    },

    /// An object store was redefined with a different schema.
    #[error("object store {store} already defined with a different schema")]
    SchemaMismatch {
        /// Name of the object store.
        store: String,
    },

    /// A schema is not valid.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A record with the same primary key already exists.
    #[error("key already exists: {id}")]
    KeyExists {
        /// The conflicting primary key.
        id: String,
    },

    /// A unique index would contain a duplicate key.
    #[error("unique index {index} already contains key {key}")]
    ConstraintViolation {
        /// Name of the violated index.
        index: String,
        /// Display form of the duplicate key.
        key: String,
    },

    /// A write was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The request or its transaction was aborted.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for the abort.
        reason: String,
    },

    /// The database directory is locked by another handle.
    #[error("database locked: {path}")]
    Locked {
        /// Path of the lock file.
        path: PathBuf,
    },
}

impl StorageError {
    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Creates a store not found error.
    pub fn store_not_found(name: impl Into<String>) -> Self {
        Self::StoreNotFound { name: name.into() }
    }
}
