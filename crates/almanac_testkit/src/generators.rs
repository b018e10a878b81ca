//! Property-based test generators using proptest.
//!
//! Queries and index sets draw their field names from a small shared pool
//! so that generated queries actually hit generated indexes.

use almanac_codec::{Fields, Value};
use almanac_core::Query;
use almanac_storage::IndexDescriptor;
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Field names shared by [`query_strategy`] and [`index_set_strategy`].
pub const FIELD_POOL: [&str; 5] = ["calendar_id", "startDate", "endDate", "title", "done"];

/// Strategy for generating scalar field values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for generating record fields (never containing `id`).
pub fn fields_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z][a-zA-Z_]{0,11}")
            .expect("Invalid regex")
            .prop_filter("Field name must not be id", |name| name != "id"),
        value_strategy(),
        0..8,
    )
    .prop_map(Fields::from)
}

/// Strategy for generating partial-match queries over [`FIELD_POOL`].
pub fn query_strategy() -> impl Strategy<Value = Query> {
    prop::collection::btree_map(
        prop::sample::select(FIELD_POOL.to_vec()),
        value_strategy(),
        0..=FIELD_POOL.len(),
    )
    .prop_map(|fields: BTreeMap<&str, Value>| {
        fields
            .into_iter()
            .fold(Query::all(), |query, (field, value)| query.eq(field, value))
    })
}

/// Strategy for generating a key path of one to three distinct fields.
pub fn key_path_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence(FIELD_POOL.to_vec(), 1..=3)
        .prop_shuffle()
        .prop_map(|path| path.into_iter().map(str::to_string).collect())
}

/// Strategy for generating a set of indexes with distinct names.
pub fn index_set_strategy() -> impl Strategy<Value = Vec<IndexDescriptor>> {
    prop::collection::btree_set(key_path_strategy(), 0..6)
        .prop_map(|paths| paths.into_iter().map(IndexDescriptor::new).collect())
}
