//! Pending operations of a bulk transaction.

use almanac_codec::{Fields, Record};
use std::fmt;

/// What a bulk operation does to its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Add the record.
    Insert,
    /// Merge new values over the record.
    Update,
    /// Remove the record.
    Delete,
    /// Leave the record alone.
    Nothing,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Nothing => "NOTHING",
        };
        f.write_str(name)
    }
}

/// One pending operation against a single record.
///
/// For a pending insert the id is a provisional handle; the stored id is
/// generated when the insert is applied. Reverse operations built during a
/// commit carry real ids and are applied with `restore` so the record keeps
/// its id and exact field set.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    id: String,
    kind: OperationKind,
    old_kind: OperationKind,
    values: Fields,
    restore: bool,
    stored_id: Option<String>,
}

impl BulkOperation {
    /// An untouched record of the working set.
    pub(crate) fn nothing(record: Record) -> Self {
        let id = record.id().to_string();
        Self {
            id,
            kind: OperationKind::Nothing,
            old_kind: OperationKind::Nothing,
            values: record.into_fields(),
            restore: false,
            stored_id: None,
        }
    }

    /// A new record under a provisional handle.
    pub(crate) fn insert(handle: String, values: Fields) -> Self {
        Self {
            id: handle,
            kind: OperationKind::Insert,
            old_kind: OperationKind::Nothing,
            values: values.without_id(),
            restore: false,
            stored_id: None,
        }
    }

    /// Reverse of an applied insert: delete the stored record.
    pub(crate) fn undo_insert(stored_id: String) -> Self {
        Self {
            id: stored_id,
            kind: OperationKind::Delete,
            old_kind: OperationKind::Insert,
            values: Fields::new(),
            restore: true,
            stored_id: None,
        }
    }

    /// Reverse of an applied delete or update: write back the prior record.
    pub(crate) fn undo_with(kind: OperationKind, prior: Record) -> Self {
        let reversed = match kind {
            OperationKind::Delete => OperationKind::Insert,
            _ => OperationKind::Update,
        };
        let id = prior.id().to_string();
        Self {
            id,
            kind: reversed,
            old_kind: kind,
            values: prior.into_fields(),
            restore: true,
            stored_id: None,
        }
    }

    /// Returns the record id, or the provisional handle of a pending insert.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the current operation kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns the kind this operation superseded.
    #[must_use]
    pub fn old_kind(&self) -> OperationKind {
        self.old_kind
    }

    /// Returns the values to write (without the id).
    #[must_use]
    pub fn values(&self) -> &Fields {
        &self.values
    }

    /// Returns true for reverse operations that write back a known record.
    #[must_use]
    pub fn is_restore(&self) -> bool {
        self.restore
    }

    /// Returns the record this operation describes.
    #[must_use]
    pub fn record(&self) -> Record {
        Record::new(self.id.clone(), self.values.clone())
    }

    /// Returns the id a pending insert is written under, once assigned.
    #[must_use]
    pub fn stored_id(&self) -> Option<&str> {
        self.stored_id.as_deref()
    }

    /// Fixes the id of a pending insert so a retry reuses it.
    pub(crate) fn assign_stored_id(&mut self, id: impl FnOnce() -> String) -> &str {
        self.stored_id.get_or_insert_with(id)
    }

    /// Merges `update` into the values.
    ///
    /// A pending insert stays an insert; anything else becomes an update.
    /// Updating a scheduled delete cancels the delete first.
    pub(crate) fn apply_update(&mut self, update: &Fields) {
        if self.kind == OperationKind::Delete {
            self.kind = self.old_kind;
        }
        self.values = self.values.merged(update);
        if self.kind != OperationKind::Insert {
            self.old_kind = self.kind;
            self.kind = OperationKind::Update;
        }
    }

    /// Turns the operation into a delete, remembering the prior kind.
    ///
    /// Deleting twice keeps the kind the first delete superseded.
    pub(crate) fn apply_delete(&mut self) {
        if self.kind != OperationKind::Delete {
            self.old_kind = self.kind;
            self.kind = OperationKind::Delete;
        }
    }

    /// True for a delete of a record that was only ever a pending insert.
    pub(crate) fn is_cancelled_insert(&self) -> bool {
        self.kind == OperationKind::Delete && self.old_kind == OperationKind::Insert && !self.restore
    }
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (was {})", self.kind, self.id, self.old_kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new("a", Fields::new().with("v", 1))
    }

    #[test]
    fn update_supersedes_nothing() {
        let mut op = BulkOperation::nothing(record());
        op.apply_update(&Fields::new().with("v", 2));
        assert_eq!(op.kind(), OperationKind::Update);
        assert_eq!(op.old_kind(), OperationKind::Nothing);
        assert_eq!(op.values(), &Fields::new().with("v", 2));
    }

    #[test]
    fn update_keeps_insert() {
        let mut op = BulkOperation::insert("h".into(), Fields::new().with("v", 1));
        op.apply_update(&Fields::new().with("w", 2));
        assert_eq!(op.kind(), OperationKind::Insert);
        assert_eq!(op.values(), &Fields::new().with("v", 1).with("w", 2));
    }

    #[test]
    fn delete_remembers_prior_kind() {
        let mut op = BulkOperation::nothing(record());
        op.apply_update(&Fields::new().with("v", 2));
        op.apply_delete();
        assert_eq!(op.kind(), OperationKind::Delete);
        assert_eq!(op.old_kind(), OperationKind::Update);
        assert!(!op.is_cancelled_insert());

        let mut op = BulkOperation::insert("h".into(), Fields::new());
        op.apply_delete();
        assert!(op.is_cancelled_insert());
    }

    #[test]
    fn repeated_delete_keeps_first_prior_kind() {
        let mut op = BulkOperation::nothing(record());
        op.apply_update(&Fields::new().with("v", 2));
        op.apply_delete();
        op.apply_delete();
        assert_eq!(op.kind(), OperationKind::Delete);
        assert_eq!(op.old_kind(), OperationKind::Update);

        let mut op = BulkOperation::insert("h".into(), Fields::new());
        op.apply_delete();
        op.apply_delete();
        assert!(op.is_cancelled_insert());
    }

    #[test]
    fn update_cancels_a_delete() {
        let mut op = BulkOperation::nothing(record());
        op.apply_delete();
        op.apply_update(&Fields::new().with("v", 3));
        assert_eq!(op.kind(), OperationKind::Update);
        assert_eq!(op.old_kind(), OperationKind::Nothing);
        assert_eq!(op.values(), &Fields::new().with("v", 3));

        let mut op = BulkOperation::insert("h".into(), Fields::new().with("v", 1));
        op.apply_delete();
        op.apply_update(&Fields::new().with("w", 2));
        assert_eq!(op.kind(), OperationKind::Insert);
        assert!(!op.is_cancelled_insert());
    }

    #[test]
    fn stored_id_is_assigned_once() {
        let mut op = BulkOperation::insert("h".into(), Fields::new());
        assert_eq!(op.stored_id(), None);
        assert_eq!(op.assign_stored_id(|| "s1".into()), "s1");
        assert_eq!(op.assign_stored_id(|| "s2".into()), "s1");
        assert_eq!(op.stored_id(), Some("s1"));
    }

    #[test]
    fn reverse_operations() {
        let undo = BulkOperation::undo_with(OperationKind::Delete, record());
        assert_eq!(undo.kind(), OperationKind::Insert);
        assert!(undo.is_restore());
        assert_eq!(undo.record(), record());

        let undo = BulkOperation::undo_with(OperationKind::Update, record());
        assert_eq!(undo.kind(), OperationKind::Update);

        let undo = BulkOperation::undo_insert("new".into());
        assert_eq!(undo.kind(), OperationKind::Delete);
        assert_eq!(undo.id(), "new");
        assert!(!undo.is_cancelled_insert());
    }

    #[test]
    fn display() {
        let mut op = BulkOperation::nothing(record());
        op.apply_delete();
        assert_eq!(op.to_string(), "DELETE a (was NOTHING)");
    }
}
