//! One engine invocation per scenario.
//!
//! Assembles the parameter set (crop + soil + site defaults), applies the
//! vernalization override where the crop needs it, runs the engine and
//! attaches the GDD columns. Any failure is returned as a `ScenarioError`
//! for the scheduler to record; nothing here aborts a batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::models::{CropProfile, SoilParams};
use crate::services::agromanagement::{AgroCalendar, ScheduleError};
use crate::services::engine::{CropEngine, EngineError, ParameterSet, RawRunOutput, RunSummary};
use crate::services::gdd::{attach_gdd, GddSeries};
use crate::services::weather::WeatherProvider;

/// Vernalization parameters zeroed for crops flagged `needs_vern_override`.
pub const VERNALIZATION_PARAMS: [&str; 3] = ["VERNSAT", "VERNBASE", "VERNDVS"];

/// Default for `NSOILBASE_FR` when the soil does not set it.
const DEFAULT_NSOILBASE_FR: f64 = 0.025;

/// Fixed soil-water settings that are not user-editable.
const SOIL_DEFAULTS: [(&str, f64); 5] = [
    ("IFUNRN", 0.0),
    ("SSMAX", 0.0),
    ("SSI", 0.0),
    ("WAV", 50.0),
    ("NOTINF", 0.0),
];

/// Site-level settings shared by every run.
const SITE_DEFAULTS: [(&str, f64); 3] = [("CO2", 415.0), ("NAVAILI", 20.0), ("BG_N_SUPPLY", 0.5)];

/// Why a single scenario produced no result.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Engine returned no summary output")]
    MissingSummary,
}

/// A successful run, GDD columns attached.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub output: RawRunOutput,
    pub summary: RunSummary,
    pub gdd: GddSeries,
}

/// Build the engine parameter set for `crop` on `soil`.
pub fn assemble_parameters(crop: &CropProfile, soil: &SoilParams) -> ParameterSet {
    let mut soil_map: BTreeMap<String, f64> = SOIL_DEFAULTS
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
    let supplied = [
        ("SM0", soil.sm0),
        ("SMFCF", soil.smfcf),
        ("SMW", soil.smw),
        ("CRAIRC", soil.crairc),
        ("RDMSOL", soil.rdmsol),
        ("K0", soil.k0),
        ("SOPE", soil.sope),
        ("KSUB", soil.ksub),
        ("SMLIM", soil.smfcf),
        ("NSOILBASE", soil.nsoilbase),
        (
            "NSOILBASE_FR",
            soil.nsoilbase_fr.unwrap_or(DEFAULT_NSOILBASE_FR),
        ),
    ];
    for (k, v) in supplied {
        soil_map.insert(k.to_string(), v);
    }

    let site = SITE_DEFAULTS
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();

    let mut params = ParameterSet {
        crop_name: crop.key.clone(),
        variety_name: crop.variety.clone(),
        soil: soil_map,
        site,
        overrides: BTreeMap::new(),
    };
    if crop.needs_vern_override {
        apply_vernalization_override(&mut params);
    }
    params
}

/// Zero the vernalization parameters, whatever the crop file says.
pub fn apply_vernalization_override(params: &mut ParameterSet) {
    for name in VERNALIZATION_PARAMS {
        params.overrides.insert(name.to_string(), 0.0);
    }
}

/// Runs scenarios against one engine and one weather provider.
#[derive(Clone)]
pub struct SimulationRunner {
    engine: Arc<dyn CropEngine>,
    weather: Arc<dyn WeatherProvider>,
}

impl SimulationRunner {
    pub fn new(engine: Arc<dyn CropEngine>, weather: Arc<dyn WeatherProvider>) -> Self {
        Self { engine, weather }
    }

    pub fn run_scenario(
        &self,
        params: &ParameterSet,
        calendar: &AgroCalendar,
    ) -> Result<CompletedRun, ScenarioError> {
        let result = self
            .engine
            .run_till_terminate(params, self.weather.as_ref(), calendar)?;
        let summary = result.summary.ok_or(ScenarioError::MissingSummary)?;

        let mut output = result.daily;
        let gdd = attach_gdd(&mut output, self.weather.as_ref())?;
        if gdd.missing_days > 0 {
            tracing::warn!(
                "Runner: {} of {} days had no weather for GDD",
                gdd.missing_days,
                output.len()
            );
        }

        Ok(CompletedRun {
            output,
            summary,
            gdd,
        })
    }
}
