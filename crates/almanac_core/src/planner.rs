//! Index planning for partial-match queries.
//!
//! The planner reduces a [`Query`] to one access path plus a list of
//! residual fields that must be compared in memory while scanning:
//!
//! - a text `id` condition becomes a primary key lookup
//! - otherwise the index whose key path is fully supplied by the query and
//!   overlaps it the most is used
//! - with no such index the whole object store is scanned
//!
//! Residual fields are exactly the queried fields outside the chosen key
//! path, in query order.

use crate::query::Query;
use almanac_codec::{IndexKey, KeyPart, Value, ID_FIELD};
use almanac_storage::IndexDescriptor;
use std::collections::HashMap;
use std::fmt;

/// How a planned query reaches its candidate records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Point lookup on the primary key.
    PrimaryKey(String),
    /// Lookup of an exact key on a secondary index.
    Index {
        /// Index name.
        name: String,
        /// Ordered key values for the index's key path.
        key: IndexKey,
    },
    /// Scan of every record.
    FullScan,
}

/// The outcome of planning a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    access: Access,
    residual: Vec<String>,
}

impl QueryPlan {
    /// Returns the access path.
    #[must_use]
    pub fn access(&self) -> &Access {
        &self.access
    }

    /// Returns the chosen secondary index name, if any.
    #[must_use]
    pub fn index_name(&self) -> Option<&str> {
        match &self.access {
            Access::Index { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the ordered index key, if an index was chosen.
    #[must_use]
    pub fn key(&self) -> Option<&IndexKey> {
        match &self.access {
            Access::Index { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Returns the queried fields not covered by the access path.
    #[must_use]
    pub fn residual(&self) -> &[String] {
        &self.residual
    }

    /// Returns true if the plan scans every record.
    #[must_use]
    pub fn is_full_scan(&self) -> bool {
        matches!(self.access, Access::FullScan)
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.access {
            Access::PrimaryKey(id) => write!(f, "primary key {id:?}")?,
            Access::Index { name, key } => write!(f, "index {name} key {key}")?,
            Access::FullScan => write!(f, "full scan")?,
        }
        if !self.residual.is_empty() {
            write!(f, ", filter on {}", self.residual.join(", "))?;
        }
        Ok(())
    }
}

/// Maps each field to the indexes that cover it.
///
/// Built once from a store's index descriptors and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct IndexRegistry {
    descriptors: Vec<IndexDescriptor>,
    by_field: HashMap<String, Vec<usize>>,
}

impl IndexRegistry {
    /// Builds the registry from index descriptors in registration order.
    #[must_use]
    pub fn new(descriptors: &[IndexDescriptor]) -> Self {
        let mut by_field: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, descriptor) in descriptors.iter().enumerate() {
            for field in descriptor.key_path() {
                let covering = by_field.entry(field.clone()).or_default();
                if !covering.contains(&position) {
                    covering.push(position);
                }
            }
        }
        Self {
            descriptors: descriptors.to_vec(),
            by_field,
        }
    }

    /// Returns the registered descriptors.
    #[must_use]
    pub fn descriptors(&self) -> &[IndexDescriptor] {
        &self.descriptors
    }

    /// Returns the names of the indexes covering `field`.
    pub fn covering(&self, field: &str) -> impl Iterator<Item = &str> {
        self.by_field
            .get(field)
            .into_iter()
            .flatten()
            .map(|&i| self.descriptors[i].name())
    }

    /// Plans a query.
    #[must_use]
    pub fn plan(&self, query: &Query) -> QueryPlan {
        if query.is_empty() {
            return QueryPlan {
                access: Access::FullScan,
                residual: Vec::new(),
            };
        }

        if let Some(Value::Text(id)) = query.get(ID_FIELD) {
            return QueryPlan {
                access: Access::PrimaryKey(id.clone()),
                residual: residual_outside(query, &[ID_FIELD]),
            };
        }

        // Candidates in first-seen order across the queried fields.
        let mut candidates: Vec<usize> = Vec::new();
        for field in query.field_names() {
            for &position in self.by_field.get(field).into_iter().flatten() {
                if !candidates.contains(&position) {
                    candidates.push(position);
                }
            }
        }

        let mut best: Option<(usize, i64)> = None;
        for position in candidates {
            let key_path = self.descriptors[position].key_path();
            let mut score = 0i64;
            let mut complete = true;
            for field in key_path {
                if query.contains(field) {
                    score += 1;
                } else {
                    score -= 1;
                    complete = false;
                }
            }
            // An index missing a key value cannot be looked up.
            if !complete {
                continue;
            }
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((position, score));
            }
        }

        let Some((position, _)) = best else {
            return QueryPlan {
                access: Access::FullScan,
                residual: query.field_names().map(str::to_string).collect(),
            };
        };

        let descriptor = &self.descriptors[position];
        let key = IndexKey::new(
            descriptor
                .key_path()
                .iter()
                .map(|field| KeyPart::from_field(query.get(field)))
                .collect(),
        );
        QueryPlan {
            access: Access::Index {
                name: descriptor.name().to_string(),
                key,
            },
            residual: residual_outside(query, descriptor.key_path()),
        }
    }
}

fn residual_outside<S: AsRef<str>>(query: &Query, covered: &[S]) -> Vec<String> {
    query
        .field_names()
        .filter(|field| !covered.iter().any(|c| c.as_ref() == *field))
        .map(str::to_string)
        .collect()
}
