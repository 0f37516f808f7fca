//! Growing degree days from raw weather, independent of the engine.
//!
//! Every day in a run's output is looked up again in the weather provider;
//! a failed lookup contributes 0 for that day and never fails the run.

use chrono::NaiveDate;

use crate::services::engine::{EngineError, RawRunOutput};
use crate::services::weather::WeatherProvider;

/// Base temperature (°C).
pub const BASE_TEMPERATURE_C: f64 = 0.0;

/// Output column holding cumulative GDD.
pub const GDD_COLUMN: &str = "GDD";

/// Output column holding daily GDD.
pub const DAILY_GDD_COLUMN: &str = "daily_GDD";

/// Daily and cumulative GDD, index-aligned with the input days.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GddSeries {
    pub daily: Vec<f64>,
    pub cumulative: Vec<f64>,
    /// Days whose weather lookup failed (counted as 0).
    pub missing_days: usize,
}

impl GddSeries {
    pub fn total(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }
}

/// max(0, (tmax + tmin) / 2 - base)
pub fn daily_gdd(tmax: f64, tmin: f64, base: f64) -> f64 {
    let value = (tmax + tmin) / 2.0 - base;
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

pub fn compute_gdd(days: &[NaiveDate], weather: &dyn WeatherProvider) -> GddSeries {
    let mut series = GddSeries {
        daily: Vec::with_capacity(days.len()),
        cumulative: Vec::with_capacity(days.len()),
        missing_days: 0,
    };
    let mut running = 0.0;

    for &day in days {
        let gdd = match weather.sample(day) {
            Ok(w) => daily_gdd(w.tmax, w.tmin, BASE_TEMPERATURE_C),
            Err(e) => {
                tracing::warn!("GDD: weather lookup failed for {}, counting 0: {}", day, e);
                series.missing_days += 1;
                0.0
            }
        };
        running += gdd;
        series.daily.push(gdd);
        series.cumulative.push(running);
    }

    series
}

/// Compute GDD for `output`'s days and attach the cumulative and daily columns.
pub fn attach_gdd(
    output: &mut RawRunOutput,
    weather: &dyn WeatherProvider,
) -> Result<GddSeries, EngineError> {
    let series = compute_gdd(output.days(), weather);
    output.attach_column(GDD_COLUMN, series.cumulative.clone())?;
    output.attach_column(DAILY_GDD_COLUMN, series.daily.clone())?;
    Ok(series)
}
