use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use formwork_engine::catalog::Catalog;

use crate::CliError;

/// Read and deserialize a JSON file.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = fs::read_to_string(path)
        .map_err(|e| CliError::usage(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| CliError::usage(format!("{}: {}", path.display(), e)))
}

/// Load a `{ "variables": [...], "products": [...] }` catalog file.
pub(crate) fn load_catalog(path: &Path) -> Result<Catalog, CliError> {
    let catalog: Catalog = read_json(path)?;
    log::debug!(
        "Loaded {} variables and {} products from {}",
        catalog.variables.len(),
        catalog.products.len(),
        path.display()
    );
    Ok(catalog)
}

/// Format a value with a fixed number of decimals.
pub(crate) fn format_value(value: f64, precision: usize) -> String {
    format!("{:.*}", precision, value)
}
