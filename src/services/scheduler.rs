//! Batch orchestration: setup, the sequential scenario loop, and progress.
//!
//! A batch runs on one blocking task. Setup failures (unknown catalog keys,
//! weather unavailable, engine missing) end the batch with a single
//! `BatchEvent::Failed`. Scenario failures are recorded and the loop moves
//! on. Events are delivered in order to exactly one receiver, and exactly one
//! terminal event (`Completed` or `Failed`) is sent per batch.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use utoipa::ToSchema;

use crate::catalog::models::{CropProfile, FertilizerScenario, Location, SoilParams};
use crate::catalog::{ensure_unique, presets, Catalog, CatalogError};
use crate::services::aggregator::{BatchResult, ResultAggregator};
use crate::services::agromanagement::build_agro_calendar;
use crate::services::engine::{CropEngine, EngineError};
use crate::services::runner::{assemble_parameters, ScenarioError, SimulationRunner};
use crate::services::weather::{collect_year, WeatherError, WeatherSource};

// ---------------------------------------------------------------------------
// Progress milestones (percent)
// ---------------------------------------------------------------------------

const PROGRESS_SETUP: u8 = 5;
const PROGRESS_WEATHER_READY: u8 = 15;
const PROGRESS_LOOP_START: u8 = 20;
const PROGRESS_LOOP_SPAN: u8 = 70;
const PROGRESS_FINALIZING: u8 = 95;
const PROGRESS_DONE: u8 = 100;

/// Year used for the default planting date when a request gives none.
const DEFAULT_SEASON_YEAR: i32 = 2023;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Batch-fatal failures.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Unknown crop '{0}'")]
    UnknownCrop(String),
    #[error("Unknown location '{0}'")]
    UnknownLocation(String),
    #[error("Unknown soil '{0}'")]
    UnknownSoil(String),
    #[error("Invalid batch configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid batch input: {0}")]
    InvalidInput(#[from] CatalogError),
    #[error("Weather unavailable: {0}")]
    Weather(#[from] WeatherError),
    #[error("Engine unavailable: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Debug)]
pub enum BatchEvent {
    Progress { percent: u8, message: String },
    Completed(Box<BatchResult>),
    Failed(BatchError),
}

/// Emits progress, never letting the percentage go backwards.
pub struct ProgressReporter {
    events: UnboundedSender<BatchEvent>,
    last: u8,
}

impl ProgressReporter {
    pub fn new(events: UnboundedSender<BatchEvent>) -> Self {
        Self { events, last: 0 }
    }

    pub fn report(&mut self, percent: u8, message: impl Into<String>) {
        let percent = percent.clamp(self.last, PROGRESS_DONE);
        self.last = percent;
        let message = message.into();
        tracing::debug!("Batch progress {}%: {}", percent, message);
        self.send(BatchEvent::Progress { percent, message });
    }

    fn send(&self, event: BatchEvent) {
        // The listener may have gone away; the batch still runs to completion.
        if self.events.send(event).is_err() {
            tracing::debug!("Batch listener dropped, event discarded");
        }
    }
}

/// Percent reported when `completed` of `total` scenarios are done.
pub fn loop_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_LOOP_START;
    }
    let done = completed.min(total);
    PROGRESS_LOOP_START + (usize::from(PROGRESS_LOOP_SPAN) * done / total) as u8
}

// ---------------------------------------------------------------------------
// Request and plan
// ---------------------------------------------------------------------------

/// What the caller asks for. Validated into a `BatchPlan` before anything runs.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchRequest {
    /// Crop catalog key (e.g. "barley")
    pub crop: String,
    /// Location catalog key (e.g. "trans_nzoia")
    pub location: String,
    /// Soil catalog key; defaults to "nitisol". Not allowed with `soil_params`.
    #[serde(default)]
    pub soil: Option<String>,
    /// Full soil parameter set used instead of a catalog soil
    #[serde(default)]
    pub soil_params: Option<SoilParams>,
    /// Defaults to the crop's planting month/day in 2023
    #[serde(default)]
    pub planting_date: Option<NaiveDate>,
    /// Replaces the catalog scenario list
    #[serde(default)]
    pub scenarios: Option<Vec<FertilizerScenario>>,
}

/// A validated batch, resolved against the catalog.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub crop: CropProfile,
    pub location: Location,
    pub soil: SoilParams,
    pub planting_date: NaiveDate,
    /// All scenarios in catalog order, enabled or not.
    pub scenarios: Vec<FertilizerScenario>,
}

impl BatchPlan {
    pub fn resolve(catalog: &Catalog, request: &BatchRequest) -> Result<Self, BatchError> {
        let crop = catalog
            .crop(&request.crop)
            .cloned()
            .ok_or_else(|| BatchError::UnknownCrop(request.crop.clone()))?;
        let location = catalog
            .location(&request.location)
            .cloned()
            .ok_or_else(|| BatchError::UnknownLocation(request.location.clone()))?;

        let soil = match (&request.soil_params, &request.soil) {
            (Some(_), Some(key)) => {
                return Err(BatchError::InvalidConfig(format!(
                    "give either soil '{}' or soil_params, not both",
                    key
                )))
            }
            (Some(params), None) => params.clone(),
            (None, _) => {
                let key = request.soil.as_deref().unwrap_or(presets::DEFAULT_SOIL_KEY);
                catalog
                    .soil(key)
                    .map(|s| s.params.clone())
                    .ok_or_else(|| BatchError::UnknownSoil(key.to_string()))?
            }
        };
        soil.validate("soil_params")?;

        let planting_date = match request.planting_date {
            Some(date) => date,
            None => NaiveDate::from_ymd_opt(DEFAULT_SEASON_YEAR, crop.planting_month, crop.planting_day)
                .ok_or_else(|| {
                    BatchError::InvalidConfig(format!("crop '{}' has no valid planting date", crop.key))
                })?,
        };

        let scenarios = match &request.scenarios {
            Some(list) => {
                for s in list {
                    s.validate()?;
                }
                ensure_unique("scenario name", list.iter().map(|s| s.name.as_str()))?;
                list.clone()
            }
            None => catalog.scenarios().to_vec(),
        };

        Ok(Self {
            crop,
            location,
            soil,
            planting_date,
            scenarios,
        })
    }

    pub fn enabled_scenarios(&self) -> impl Iterator<Item = &FertilizerScenario> {
        self.scenarios.iter().filter(|s| s.enabled)
    }
}

// ---------------------------------------------------------------------------
// Batch execution
// ---------------------------------------------------------------------------

/// Run a whole batch on the current thread, reporting through `events`.
pub fn run_batch(
    plan: &BatchPlan,
    engine: Arc<dyn CropEngine>,
    weather_source: &dyn WeatherSource,
    events: UnboundedSender<BatchEvent>,
) {
    let mut progress = ProgressReporter::new(events);
    match execute(plan, engine, weather_source, &mut progress) {
        Ok(result) => {
            tracing::info!(
                "Batch finished: {} succeeded, {} skipped",
                result.results.len(),
                result.skipped.len()
            );
            progress.send(BatchEvent::Completed(Box::new(result)));
        }
        Err(e) => {
            tracing::error!("Batch aborted: {}", e);
            progress.send(BatchEvent::Failed(e));
        }
    }
}

fn execute(
    plan: &BatchPlan,
    engine: Arc<dyn CropEngine>,
    weather_source: &dyn WeatherSource,
    progress: &mut ProgressReporter,
) -> Result<BatchResult, BatchError> {
    progress.report(PROGRESS_SETUP, "Preparing simulation inputs...");
    engine.check_available()?;
    let weather = weather_source.open(&plan.location)?;
    progress.report(
        PROGRESS_WEATHER_READY,
        format!("Weather ready for {}", plan.location.name),
    );

    let year = plan.planting_date.year();
    let weather_year = collect_year(weather.as_ref(), year);
    let runner = SimulationRunner::new(engine, weather);
    let mut aggregator =
        ResultAggregator::new(plan.crop.crop_class).with_phenology(plan.crop.phenology.clone());
    let params = assemble_parameters(&plan.crop, &plan.soil);

    let total = plan.enabled_scenarios().count();
    tracing::info!(
        "Batch started: crop '{}' at '{}', planting {}, {} of {} scenarios enabled",
        plan.crop.key,
        plan.location.name,
        plan.planting_date,
        total,
        plan.scenarios.len()
    );

    for (completed, scenario) in plan.enabled_scenarios().enumerate() {
        progress.report(
            loop_progress(completed, total),
            format!("Running: {}...", scenario.name),
        );

        let outcome = build_agro_calendar(&plan.crop, plan.planting_date, scenario)
            .map_err(ScenarioError::from)
            .and_then(|calendar| runner.run_scenario(&params, &calendar));

        match outcome {
            Ok(run) => aggregator.record_success(scenario, run),
            Err(e) => {
                tracing::warn!("Scenario '{}' skipped: {}", scenario.key, e);
                aggregator.record_skip(scenario, e.to_string());
            }
        }
    }

    progress.report(PROGRESS_FINALIZING, "Finalizing results...");
    let result = aggregator.finish(weather_year, year, &plan.location.name);
    progress.report(PROGRESS_DONE, "Done!");
    Ok(result)
}

/// Admission to the engine. Batches sharing a slot run one after another,
/// so engine calls never overlap even across batches.
#[derive(Debug, Clone)]
pub struct EngineSlot(Arc<Semaphore>);

impl EngineSlot {
    pub fn new() -> Self {
        Self(Arc::new(Semaphore::new(1)))
    }
}

impl Default for EngineSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Start a batch and return its event stream. The batch waits for `slot`
/// and then runs on a blocking task holding it until the terminal event.
pub fn spawn_batch(
    plan: BatchPlan,
    engine: Arc<dyn CropEngine>,
    weather_source: Arc<dyn WeatherSource>,
    slot: EngineSlot,
) -> UnboundedReceiver<BatchEvent> {
    let (tx, rx) = unbounded_channel();
    tokio::spawn(async move {
        // The semaphore is never closed; if it were, dropping `tx` lets the
        // listener see a batch that ended without a terminal event.
        let Ok(permit) = slot.0.acquire_owned().await else {
            tracing::error!("Engine slot closed, batch not started");
            return;
        };
        let batch = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_batch(&plan, engine, weather_source.as_ref(), tx);
        });
        if let Err(e) = batch.await {
            tracing::error!("Batch task aborted: {}", e);
        }
    });
    rx
}
