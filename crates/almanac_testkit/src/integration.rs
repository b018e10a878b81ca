//! Cross-crate integration test helpers.
//!
//! Provides a harness that tracks what a record store should contain, an
//! oracle for query plans, and the end-to-end tests that exercise codec,
//! storage and core together.

use almanac_codec::{Fields, Record};
use almanac_core::{Access, IndexRegistry, Query, RecordStore};
use almanac_storage::{IndexDescriptor, StorageBackend};
use std::collections::BTreeMap;

/// A record store plus the records it is expected to hold.
pub struct IntegrationHarness<B: StorageBackend> {
    /// The store under test.
    pub store: RecordStore<B>,
    expected: BTreeMap<String, Record>,
}

impl<B: StorageBackend> IntegrationHarness<B> {
    /// Wraps an empty record store.
    pub fn new(store: RecordStore<B>) -> Self {
        Self {
            store,
            expected: BTreeMap::new(),
        }
    }

    /// Adds a record and tracks it.
    pub async fn add(&mut self, fields: Fields) -> Record {
        let record = self.store.add(fields).await.expect("Failed to add record");
        self.expected.insert(record.id().to_string(), record.clone());
        record
    }

    /// Removes a record and stops tracking it.
    pub async fn remove(&mut self, id: &str) -> Record {
        let record = self.store.remove(id).await.expect("Failed to remove record");
        self.expected.remove(id);
        record
    }

    /// Re-reads every record the store reports.
    pub async fn refresh_expected(&mut self) {
        self.expected = self
            .store
            .try_get_all()
            .await
            .expect("Failed to read records")
            .into_iter()
            .map(|record| (record.id().to_string(), record))
            .collect();
    }

    /// Asserts the store holds exactly the tracked records.
    pub async fn verify_all(&self) {
        let actual: BTreeMap<String, Record> = self
            .store
            .try_get_all()
            .await
            .expect("Failed to read records")
            .into_iter()
            .map(|record| (record.id().to_string(), record))
            .collect();
        assert_eq!(actual, self.expected, "Store contents mismatch");
    }

    /// Returns the tracked record with this id.
    pub fn expected(&self, id: &str) -> Option<&Record> {
        self.expected.get(id)
    }

    /// Returns the count of tracked records.
    pub fn tracked_count(&self) -> usize {
        self.expected.len()
    }
}

/// Query plan checks.
pub mod plans {
    use super::*;

    /// Asserts the planner's choice for `query` over `indexes` is optimal.
    ///
    /// An optimal plan uses an index whose key path lies within the query's
    /// fields and is at least as long as any other such index; with no such
    /// index it scans. The residual fields are exactly the query fields
    /// outside the chosen key path.
    pub fn assert_optimal(indexes: &[IndexDescriptor], query: &Query) {
        let plan = IndexRegistry::new(indexes).plan(query);
        let usable: Vec<&IndexDescriptor> = indexes
            .iter()
            .filter(|index| index.key_path().iter().all(|f| query.contains(f)))
            .collect();
        let best = usable.iter().map(|index| index.key_path().len()).max();

        let key_path: Vec<String> = match plan.access() {
            Access::Index { name, key } => {
                let chosen = indexes
                    .iter()
                    .find(|index| index.name() == name)
                    .unwrap_or_else(|| panic!("Plan names unknown index {name}"));
                assert!(
                    usable.iter().any(|index| index.name() == name),
                    "Chosen index {name} is not covered by the query"
                );
                assert_eq!(Some(chosen.key_path().len()), best, "Index {name} is not maximal");
                assert_eq!(key.len(), chosen.key_path().len());
                chosen.key_path().to_vec()
            }
            Access::FullScan => {
                assert!(
                    query.is_empty() || usable.is_empty(),
                    "Plan scans although an index is usable"
                );
                Vec::new()
            }
            Access::PrimaryKey(_) => vec!["id".to_string()],
        };

        let mut expected: Vec<&str> = query
            .field_names()
            .filter(|field| !key_path.iter().any(|k| k == field))
            .collect();
        expected.sort_unstable();
        let mut residual: Vec<&str> = plan.residual().iter().map(String::as_str).collect();
        residual.sort_unstable();
        assert_eq!(residual, expected, "Residual fields mismatch");
    }
}
