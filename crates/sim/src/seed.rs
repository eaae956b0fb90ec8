//! Registry seeding.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};

use stockroom_inventory::{ProductRecord, ProductRegistry};

/// Built-in catalogue used when no seed file is configured.
pub fn default_products() -> Vec<ProductRecord> {
    vec![
        ProductRecord::new(1, "Laptop", 5_000_000, 100),
        ProductRecord::new(2, "Mouse", 150_000, 200),
        ProductRecord::new(3, "Keyboard", 300_000, 150),
    ]
}

/// Read a JSON array of product records.
pub fn load_products(path: &Path) -> Result<Vec<ProductRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    let records: Vec<ProductRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("seed file {} is not a JSON array of products", path.display()))?;
    ensure!(!records.is_empty(), "seed file {} has no products", path.display());
    Ok(records)
}

pub fn build_registry(seed_file: Option<&Path>) -> Result<ProductRegistry> {
    let records = match seed_file {
        Some(path) => load_products(path)?,
        None => default_products(),
    };
    ProductRegistry::from_records(records).context("invalid product seed")
}
