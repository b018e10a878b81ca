//! Explain command implementation.

use super::json::parse_query;
use super::open_store;
use std::path::Path;

/// Runs the explain command.
pub fn run(path: &Path, store: &str, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let query = parse_query(query)?;
    let store = open_store(path, store)?;
    println!("{}", store.explain(&query));
    Ok(())
}
