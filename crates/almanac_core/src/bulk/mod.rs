//! Bulk transactions: batched inserts, updates and deletes that either all
//! go through or are rolled back.

mod operation;
mod transaction;

pub use operation::{BulkOperation, OperationKind};
pub use transaction::{BulkTransaction, CommitState};
