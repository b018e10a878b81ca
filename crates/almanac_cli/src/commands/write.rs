//! Add and remove command implementations.

use super::json::{from_record, parse_fields};
use super::open_store;
use std::path::Path;

/// Adds a record and prints it with its generated id.
pub async fn add(path: &Path, store: &str, fields: &str) -> Result<(), Box<dyn std::error::Error>> {
    let fields = parse_fields(fields)?;
    let store = open_store(path, store)?;
    let record = store.add(fields).await?;
    println!("{}", serde_json::to_string_pretty(&from_record(&record))?);
    Ok(())
}

/// Removes a record and prints its last value.
pub async fn remove(path: &Path, store: &str, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path, store)?;
    let record = store.remove(id).await?;
    println!("{}", serde_json::to_string_pretty(&from_record(&record))?);
    Ok(())
}
