//! Folds completed runs into the batch result.

use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::catalog::models::{CropClass, FertilizerScenario, PhenologyTable};
use crate::helpers::{kg_to_t, opt_finite_or_zero};
use crate::services::engine::{RawRunOutput, RunSummary};
use crate::services::runner::CompletedRun;
use crate::services::weather::WeatherSample;

/// Harvest index stand-in for root and tuber crops when no storage organ mass is reported.
const ROOT_TUBER_FALLBACK_FRACTION: f64 = 0.5;

/// Same, for every other crop.
const DEFAULT_FALLBACK_FRACTION: f64 = 0.4;

/// Canonical per-scenario record.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ScenarioResult {
    /// Scenario display name
    pub scenario: String,
    /// Scenario catalog key
    pub scenario_key: String,
    /// Total N applied (kg N/ha)
    pub n_rate: f64,
    /// Main yield (kg/ha)
    pub yield_kg: f64,
    /// Main yield (t/ha)
    pub yield_t: f64,
    /// Total aboveground biomass (kg/ha)
    pub tagp: f64,
    /// Peak leaf area index
    pub laimax: f64,
    /// Whether `yield_kg` came from the biomass fallback
    pub yield_from_biomass: bool,
}

/// A scenario that was run but produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SkippedScenario {
    pub scenario: String,
    pub reason: String,
}

/// Everything a finished batch hands to the consumer.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// Successful scenarios, in processing order
    pub results: Vec<ScenarioResult>,
    /// Daily output tables keyed by scenario display name
    pub outputs: BTreeMap<String, RawRunOutput>,
    pub skipped: Vec<SkippedScenario>,
    /// Daily weather for the planting year
    pub weather: Vec<WeatherSample>,
    pub weather_year: i32,
    pub location_name: String,
    /// The crop's reference phases, for placing runs by thermal time
    pub phenology: Option<PhenologyTable>,
}

/// Storage organ mass if positive, otherwise a crop-class fraction of TAGP.
/// Returns the yield (kg/ha) and whether the fallback was used.
pub fn main_yield(summary: &RunSummary, crop_class: CropClass) -> (f64, bool) {
    let twso = opt_finite_or_zero(summary.twso());
    if twso > 0.0 {
        return (twso, false);
    }
    let fraction = match crop_class {
        CropClass::RootTuber => ROOT_TUBER_FALLBACK_FRACTION,
        CropClass::Grain => DEFAULT_FALLBACK_FRACTION,
    };
    (opt_finite_or_zero(summary.tagp()) * fraction, true)
}

pub fn scenario_result(
    scenario: &FertilizerScenario,
    crop_class: CropClass,
    summary: &RunSummary,
) -> ScenarioResult {
    let (yield_kg, yield_from_biomass) = main_yield(summary, crop_class);
    ScenarioResult {
        scenario: scenario.name.clone(),
        scenario_key: scenario.key.clone(),
        n_rate: scenario.total_n,
        yield_kg,
        yield_t: kg_to_t(yield_kg),
        tagp: opt_finite_or_zero(summary.tagp()),
        laimax: opt_finite_or_zero(summary.laimax()),
        yield_from_biomass,
    }
}

/// Accumulates scenario outcomes for one batch.
#[derive(Debug)]
pub struct ResultAggregator {
    crop_class: CropClass,
    phenology: Option<PhenologyTable>,
    results: Vec<ScenarioResult>,
    outputs: BTreeMap<String, RawRunOutput>,
    skipped: Vec<SkippedScenario>,
}

impl ResultAggregator {
    pub fn new(crop_class: CropClass) -> Self {
        Self {
            crop_class,
            phenology: None,
            results: Vec::new(),
            outputs: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }

    pub fn with_phenology(mut self, phenology: Option<PhenologyTable>) -> Self {
        self.phenology = phenology;
        self
    }

    pub fn record_success(&mut self, scenario: &FertilizerScenario, run: CompletedRun) {
        let result = scenario_result(scenario, self.crop_class, &run.summary);
        tracing::debug!(
            "Aggregator: '{}' yield {:.2} t/ha{} over {} days, {:.0} GDD",
            result.scenario,
            result.yield_t,
            if result.yield_from_biomass { " (biomass fallback)" } else { "" },
            run.output.len(),
            run.gdd.total()
        );
        self.outputs.insert(scenario.name.clone(), run.output);
        self.results.push(result);
    }

    pub fn record_skip(&mut self, scenario: &FertilizerScenario, reason: impl Into<String>) {
        self.skipped.push(SkippedScenario {
            scenario: scenario.name.clone(),
            reason: reason.into(),
        });
    }

    pub fn finish(self, weather: Vec<WeatherSample>, weather_year: i32, location_name: &str) -> BatchResult {
        BatchResult {
            results: self.results,
            outputs: self.outputs,
            skipped: self.skipped,
            weather,
            weather_year,
            location_name: location_name.to_string(),
            phenology: self.phenology,
        }
    }
}
