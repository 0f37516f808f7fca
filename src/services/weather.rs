//! Daily weather provider boundary.
//!
//! The provider is opened once per batch for the batch's location and then
//! shared read-only across all scenario runs. The bundled `FileWeatherSource`
//! reads one JSON file per location; any other backend only has to implement
//! the two traits below.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use crate::catalog::models::Location;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("IO error reading weather file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in weather file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("No weather for {0}")]
    MissingDate(NaiveDate),
    #[error("Weather provider unavailable: {0}")]
    Unavailable(String),
}

/// One day of weather.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WeatherSample {
    pub date: NaiveDate,
    /// Maximum temperature (°C)
    pub tmax: f64,
    /// Minimum temperature (°C)
    pub tmin: f64,
    /// Rainfall (mm/day)
    pub rain: f64,
    /// Global radiation (MJ/m²/day)
    pub radiation: f64,
}

/// Weather lookups by calendar date for one location.
pub trait WeatherProvider: Send + Sync {
    fn sample(&self, date: NaiveDate) -> Result<WeatherSample, WeatherError>;
}

/// Opens a provider for a location. Failure here is fatal for the batch.
pub trait WeatherSource: Send + Sync {
    fn open(&self, location: &Location) -> Result<Arc<dyn WeatherProvider>, WeatherError>;
}

/// Every resolvable day in `from..=to`, in date order. Unresolvable days are skipped.
pub fn collect_range(
    provider: &dyn WeatherProvider,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<WeatherSample> {
    let mut samples = Vec::new();
    for date in from.iter_days().take_while(|d| *d <= to) {
        match provider.sample(date) {
            Ok(s) => samples.push(s),
            Err(e) => tracing::debug!("Weather: skipping {}: {}", date, e),
        }
    }
    samples
}

/// Every resolvable day of `year`, for reporting.
pub fn collect_year(provider: &dyn WeatherProvider, year: i32) -> Vec<WeatherSample> {
    match (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) {
        (Some(from), Some(to)) => collect_range(provider, from, to),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// File-backed provider
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WeatherFile {
    days: Vec<WeatherSample>,
}

/// In-memory daily weather table.
#[derive(Debug, Clone, Default)]
pub struct WeatherTable {
    days: BTreeMap<NaiveDate, WeatherSample>,
}

impl WeatherTable {
    pub fn new(samples: impl IntoIterator<Item = WeatherSample>) -> Self {
        Self {
            days: samples.into_iter().map(|s| (s.date, s)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.days.keys().map(|d| d.year()).collect();
        years.dedup();
        years
    }
}

impl WeatherProvider for WeatherTable {
    fn sample(&self, date: NaiveDate) -> Result<WeatherSample, WeatherError> {
        self.days
            .get(&date)
            .copied()
            .ok_or(WeatherError::MissingDate(date))
    }
}

/// Reads `<dir>/<location key>.json`.
#[derive(Debug, Clone)]
pub struct FileWeatherSource {
    dir: PathBuf,
}

impl FileWeatherSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl WeatherSource for FileWeatherSource {
    fn open(&self, location: &Location) -> Result<Arc<dyn WeatherProvider>, WeatherError> {
        let path = self.dir.join(format!("{}.json", location.key));
        let raw = std::fs::read_to_string(&path).map_err(|source| WeatherError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: WeatherFile = serde_json::from_str(&raw).map_err(|source| WeatherError::Json {
            path: path.display().to_string(),
            source,
        })?;
        if file.days.is_empty() {
            return Err(WeatherError::Unavailable(format!(
                "{} contains no days",
                path.display()
            )));
        }

        let table = WeatherTable::new(file.days);
        tracing::info!(
            "Weather: loaded {} days for '{}' (years {:?}) from {}",
            table.len(),
            location.name,
            table.years(),
            path.display()
        );
        Ok(Arc::new(table))
    }
}
