//! Cursors over object store records.

use almanac_codec::{IndexKey, Record};
use std::collections::VecDeque;

/// The range a cursor walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanRange {
    /// Every record in the object store, in primary key order.
    All,
    /// Records whose key on the named index equals `key`, in primary key order.
    Index {
        /// Index name.
        index: String,
        /// Exact key to match.
        key: IndexKey,
    },
}

impl ScanRange {
    /// Creates an index-scoped range.
    pub fn index(index: impl Into<String>, key: IndexKey) -> Self {
        Self::Index {
            index: index.into(),
            key,
        }
    }
}

/// A forward cursor over a snapshot of records.
///
/// The snapshot is taken when the cursor is opened, inside the transaction
/// that opened it. Writes made through the same transaction afterwards are
/// not reflected. A cursor can be stopped early with [`Cursor::stop`].
///
/// # Example
///
/// ```rust
/// use almanac_codec::{Fields, Record};
/// use almanac_storage::Cursor;
///
/// let mut cursor = Cursor::new(vec![
///     Record::new("a", Fields::new()),
///     Record::new("b", Fields::new()),
/// ]);
/// assert_eq!(cursor.advance().map(|r| r.id().to_string()), Some("a".into()));
/// cursor.stop();
/// assert!(cursor.advance().is_none());
/// assert_eq!(cursor.visited(), 1);
/// ```
#[derive(Debug)]
pub struct Cursor {
    pending: VecDeque<Record>,
    visited: usize,
    stopped: bool,
}

impl Cursor {
    /// Creates a cursor over the given records.
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            pending: records.into(),
            visited: 0,
            stopped: false,
        }
    }

    /// Moves to the next record.
    pub fn advance(&mut self) -> Option<Record> {
        if self.stopped {
            return None;
        }
        let next = self.pending.pop_front()?;
        self.visited += 1;
        Some(next)
    }

    /// Stops the cursor; later calls to [`Cursor::advance`] return `None`.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.pending.clear();
    }

    /// Returns how many records have been visited.
    #[must_use]
    pub fn visited(&self) -> usize {
        self.visited
    }

    /// Returns how many records remain.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Iterator for Cursor {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.advance()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pending.len(), Some(self.pending.len()))
    }
}
