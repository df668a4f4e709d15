//! Region registry: the list of regions the pipeline loads, read from a JSON
//! file at startup. Registry order is processing order.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::errors::AppError;
use crate::helpers::validate_coordinates;

/// A region tracked by the pipeline. Identity key is `name`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Region {
    pub name: String,
    pub capital: String,
    /// Administrative grouping (stored in the `region` column).
    #[serde(rename = "region", alias = "region_group")]
    pub region_group: String,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon")]
    pub longitude: f64,
}

/// Load and validate the registry file.
pub fn load_regions(path: &Path) -> Result<Vec<Region>, AppError> {
    let content = std::fs::read_to_string(path)?;
    parse_regions(&content)
}

/// Parse a JSON array of regions, rejecting blank or repeated names.
/// Impossible coordinates only warn here; the fetch for that region fails
/// and the rest of the run goes on.
pub fn parse_regions(json: &str) -> Result<Vec<Region>, AppError> {
    let regions: Vec<Region> = serde_json::from_str(json)?;

    let mut seen = HashSet::new();
    for region in &regions {
        if region.name.trim().is_empty() {
            return Err(AppError::Config("Region with empty name".to_string()));
        }
        if !seen.insert(region.name.as_str()) {
            return Err(AppError::Config(format!(
                "Region '{}' is listed more than once",
                region.name
            )));
        }
        if let Err(e) = validate_coordinates(region.latitude, region.longitude) {
            tracing::warn!("Region '{}' will fail to fetch: {}", region.name, e);
        }
    }

    Ok(regions)
}
