//! Read-only preset tables: crops, locations, soils and fertilizer scenarios.
//!
//! Loaded once at startup, either from the built-in presets or from JSON
//! override files in `DATA_DIR`, validated, and then shared behind an `Arc`.

pub mod models;
pub mod presets;

use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use models::{CropProfile, FertilizerScenario, Location, SoilProfile};

/// Errors that can occur while loading or validating catalog data.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error reading catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in catalog file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for '{field}' in '{owner}': {message}")]
    InvalidValue {
        owner: String,
        field: String,
        message: String,
    },
    #[error("Duplicate {kind} key '{key}'")]
    DuplicateKey { kind: String, key: String },
}

impl CatalogError {
    pub fn invalid(owner: &str, field: &str, message: impl Into<String>) -> Self {
        CatalogError::InvalidValue {
            owner: owner.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// The loaded catalog. Scenario order is catalog order.
#[derive(Debug, Clone)]
pub struct Catalog {
    crops: Vec<CropProfile>,
    locations: Vec<Location>,
    soils: Vec<SoilProfile>,
    scenarios: Vec<FertilizerScenario>,
}

impl Catalog {
    /// Catalog made only of the built-in presets.
    pub fn builtin() -> Self {
        Self {
            crops: presets::crops(),
            locations: presets::locations(),
            soils: presets::soils(),
            scenarios: presets::scenarios(),
        }
    }

    /// Load the catalog, replacing each table whose override file exists in `dir`.
    pub fn load(dir: &Path) -> Result<Self, CatalogError> {
        let catalog = Self {
            crops: load_table(dir, "crops.json", presets::crops)?,
            locations: load_table(dir, "locations.json", presets::locations)?,
            soils: load_table(dir, "soils.json", presets::soils)?,
            scenarios: load_table(dir, "scenarios.json", presets::scenarios)?,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        for c in &self.crops {
            c.validate()?;
        }
        for l in &self.locations {
            l.validate()?;
        }
        for s in &self.soils {
            s.validate()?;
        }
        for s in &self.scenarios {
            s.validate()?;
        }
        ensure_unique("crop", self.crops.iter().map(|c| c.key.as_str()))?;
        ensure_unique("location", self.locations.iter().map(|l| l.key.as_str()))?;
        ensure_unique("soil", self.soils.iter().map(|s| s.key.as_str()))?;
        ensure_unique("scenario", self.scenarios.iter().map(|s| s.key.as_str()))?;
        // Output tables are keyed by display name.
        ensure_unique("scenario name", self.scenarios.iter().map(|s| s.name.as_str()))?;
        Ok(())
    }

    pub fn crops(&self) -> &[CropProfile] {
        &self.crops
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn soils(&self) -> &[SoilProfile] {
        &self.soils
    }

    pub fn scenarios(&self) -> &[FertilizerScenario] {
        &self.scenarios
    }

    pub fn crop(&self, key: &str) -> Option<&CropProfile> {
        self.crops.iter().find(|c| c.key == key)
    }

    pub fn location(&self, key: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.key == key)
    }

    pub fn soil(&self, key: &str) -> Option<&SoilProfile> {
        self.soils.iter().find(|s| s.key == key)
    }
}

/// Read `dir/file` as a JSON array, or fall back to the presets if it does not exist.
fn load_table<T: DeserializeOwned>(
    dir: &Path,
    file: &str,
    fallback: fn() -> Vec<T>,
) -> Result<Vec<T>, CatalogError> {
    let path = dir.join(file);
    if !path.is_file() {
        tracing::debug!("No {} in {}, using built-in presets", file, dir.display());
        return Ok(fallback());
    }
    let raw = std::fs::read_to_string(&path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let rows: Vec<T> = serde_json::from_str(&raw).map_err(|source| CatalogError::Json {
        path: path.display().to_string(),
        source,
    })?;
    tracing::info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

pub(crate) fn ensure_unique<'a>(
    kind: &str,
    keys: impl Iterator<Item = &'a str>,
) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(CatalogError::DuplicateKey {
                kind: kind.to_string(),
                key: key.to_string(),
            });
        }
    }
    Ok(())
}
