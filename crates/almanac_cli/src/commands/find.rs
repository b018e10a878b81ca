//! Find command implementation.

use super::json::{from_record, parse_query};
use super::open_store;
use serde_json::Value as Json;
use std::path::Path;

/// Runs the find command, printing matches as a JSON array.
pub async fn run(
    path: &Path,
    store: &str,
    query: &str,
    first: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let query = parse_query(query)?;
    let store = open_store(path, store)?;
    tracing::debug!(plan = %store.explain(&query), "running query");

    let records: Vec<_> = if first {
        store.try_find(&query).await?.into_iter().collect()
    } else {
        store.try_find_all(&query).await?
    };

    let output = Json::Array(records.iter().map(from_record).collect());
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
