//! Inspect command implementation.

use super::open_backend;
use almanac_storage::{FileBackend, StorageBackend, StoreTransaction, TransactionMode};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Per-store statistics.
    pub stores: Vec<StoreStats>,
}

/// Statistics for a single object store.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    /// Store name.
    pub name: String,
    /// Number of records.
    pub record_count: usize,
    /// Secondary indexes.
    pub indexes: Vec<IndexStats>,
}

/// Description of one index.
#[derive(Debug, Serialize)]
pub struct IndexStats {
    /// Index name.
    pub name: String,
    /// Ordered key path.
    pub key_path: Vec<String>,
    /// Whether keys must be unique.
    pub unique: bool,
}

/// Runs the inspect command.
pub async fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let backend = open_backend(path)?;
    let result = InspectResult {
        path: path.display().to_string(),
        stores: collect_stats(&backend).await?,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

async fn collect_stats(backend: &FileBackend) -> Result<Vec<StoreStats>, Box<dyn std::error::Error>> {
    let mut stores = Vec::new();
    for name in backend.store_names() {
        let schema = backend.schema(&name)?;
        let txn = backend.transaction(&name, TransactionMode::ReadOnly).await?;
        let record_count = txn.count().await?;
        txn.commit().await?;

        stores.push(StoreStats {
            name,
            record_count,
            indexes: schema
                .indexes()
                .iter()
                .map(|index| IndexStats {
                    name: index.name().to_string(),
                    key_path: index.key_path().to_vec(),
                    unique: index.is_unique(),
                })
                .collect(),
        });
    }
    Ok(stores)
}

fn print_text_output(result: &InspectResult) {
    println!("Almanac Database: {}", result.path);
    println!("==================");
    if result.stores.is_empty() {
        println!("No object stores");
    }
    for store in &result.stores {
        println!();
        println!("{} ({} records)", store.name, store.record_count);
        for index in &store.indexes {
            let unique = if index.unique { " unique" } else { "" };
            println!("  index {} [{}]{}", index.name, index.key_path.join(", "), unique);
        }
    }
}
