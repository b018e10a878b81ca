//! Error types for Almanac core.

use almanac_codec::CodecError;
use almanac_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in record store and bulk transaction operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The underlying transactional operation failed or aborted.
    #[error("transaction error: {0}")]
    Transaction(#[from] StorageError),

    /// A record could not be converted to or from a typed value.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Nothing matched where a match was required.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked for.
        what: String,
    },

    /// A freshly added record could not be read back.
    #[error("could not create record {id}")]
    CouldNotCreate {
        /// The id the record was stored under.
        id: String,
    },

    /// The bulk transaction has already committed.
    #[error("bulk transaction already committed")]
    AlreadyCommitted,

    /// The bulk transaction is not in a state that allows a retry.
    #[error("cannot retry: {reason}")]
    CannotRetry {
        /// Why the retry was refused.
        reason: String,
    },

    /// Reverse operations failed; the store may be inconsistent.
    #[error("couldn't rollback: {reason}")]
    CannotRollback {
        /// What failed.
        reason: String,
    },

    /// The bulk transaction failed and every completed operation was undone.
    #[error("bulk transaction rolled back after {failed} failed operation(s)")]
    RolledBack {
        /// Number of operations that still failed after the retry.
        failed: usize,
    },

    /// A bulk update or delete referenced a record outside the working set.
    #[error("record {id} is not part of the bulk transaction")]
    RegistryNotFound {
        /// The unknown record id.
        id: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a cannot retry error.
    pub fn cannot_retry(reason: impl Into<String>) -> Self {
        Self::CannotRetry {
            reason: reason.into(),
        }
    }

    /// Creates a cannot rollback error.
    pub fn cannot_rollback(reason: impl Into<String>) -> Self {
        Self::CannotRollback {
            reason: reason.into(),
        }
    }

    /// Returns true for [`CoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_convert() {
        let err: CoreError = StorageError::aborted("disk full").into();
        assert!(matches!(err, CoreError::Transaction(_)));
        assert_eq!(
            err.to_string(),
            "transaction error: transaction aborted: disk full"
        );
    }

    #[test]
    fn display() {
        assert_eq!(
            CoreError::not_found("record e1").to_string(),
            "not found: record e1"
        );
        assert_eq!(
            CoreError::cannot_retry("nothing else to commit").to_string(),
            "cannot retry: nothing else to commit"
        );
        assert!(CoreError::not_found("x").is_not_found());
        assert!(!CoreError::AlreadyCommitted.is_not_found());
    }
}
