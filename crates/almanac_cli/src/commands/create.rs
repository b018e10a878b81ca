//! Create command implementation.

use almanac_storage::{FileBackend, IndexDescriptor, StoreSchema};
use std::path::Path;

/// Creates the database directory if needed and defines an object store.
///
/// Redefining an existing store with different indexes rebuilds them over
/// the stored records.
pub fn run(
    path: &Path,
    store: &str,
    indexes: &[String],
    unique: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = parse_schema(store, indexes, unique)?;
    let count = schema.indexes().len();
    FileBackend::open(path, [schema])?;
    println!("Defined store '{}' with {} index(es) at {:?}", store, count, path);
    Ok(())
}

/// Builds a schema from comma-separated key paths.
pub fn parse_schema(
    store: &str,
    indexes: &[String],
    unique: &[String],
) -> Result<StoreSchema, Box<dyn std::error::Error>> {
    let mut schema = StoreSchema::new(store);
    for spec in indexes {
        schema = schema.index(IndexDescriptor::new(parse_key_path(spec)?));
    }
    for spec in unique {
        schema = schema.index(IndexDescriptor::new(parse_key_path(spec)?).unique());
    }
    schema.validate()?;
    Ok(schema)
}

fn parse_key_path(spec: &str) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let fields: Vec<String> = spec.split(',').map(|f| f.trim().to_string()).collect();
    if fields.iter().any(String::is_empty) {
        return Err(format!("Invalid key path {:?}", spec).into());
    }
    Ok(fields)
}
