//! Batch submission, status and results.
//!
//! POST starts a batch on a blocking task and hands its event stream to a
//! tracking task; the GET routes only read the tracked status.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::AppState;
use crate::errors::{AppError, ErrorResponse};
use crate::services::aggregator::{BatchResult, SkippedScenario};
use crate::services::engine::RawRunOutput;
use crate::services::report::{
    self, PhaseBoundary, SummaryRow, DEFAULT_YIELD_GAP_FACTOR, YIELD_GAP_RANGE,
};
use crate::services::scheduler::{spawn_batch, BatchPlan, BatchRequest};
use crate::services::tracker::{register_batch, track_batch, BatchState, BatchStatus};
use crate::services::weather::WeatherSample;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Response for POST /api/v1/batches.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchAccepted {
    /// Identifier for polling the batch
    pub id: Uuid,
    /// Number of enabled scenarios that will run
    pub scenarios: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SummaryQuery {
    /// Ratio of realized to simulated yield, in [0.1, 1.0] (default 0.35)
    pub yield_gap_factor: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SummaryResponse {
    pub yield_gap_factor: f64,
    /// The crop's reference development phases in GDD; empty when unknown
    pub phases: Vec<PhaseBoundary>,
    pub rows: Vec<SummaryRow>,
    pub skipped: Vec<SkippedScenario>,
}

/// One scenario's daily output table.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScenarioOutputResponse {
    pub scenario: String,
    /// Output variables present in `table`, GDD columns included
    pub variables: Vec<String>,
    /// `days` plus one array per output variable, index-aligned
    #[schema(value_type = Object)]
    pub table: RawRunOutput,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WeatherResponse {
    pub location_name: String,
    pub year: i32,
    pub days: Vec<WeatherSample>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The finished result of a batch, or why there is none.
async fn completed_result(state: &AppState, id: Uuid) -> Result<Arc<BatchResult>, AppError> {
    let batches = state.batches.read().await;
    let status = batches
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Batch {} not found", id)))?;

    match status.state {
        BatchState::Running => Err(AppError::Conflict(format!(
            "Batch {} is still running ({}%)",
            id, status.percent
        ))),
        BatchState::Failed => Err(AppError::Conflict(format!(
            "Batch {} failed: {}",
            id,
            status.error.as_deref().unwrap_or("unknown error")
        ))),
        BatchState::Completed => status
            .result
            .clone()
            .ok_or_else(|| AppError::InternalError(format!("Batch {} has no result", id))),
    }
}

fn yield_gap_factor(query: &SummaryQuery) -> Result<f64, AppError> {
    let factor = query.yield_gap_factor.unwrap_or(DEFAULT_YIELD_GAP_FACTOR);
    if !YIELD_GAP_RANGE.contains(&factor) {
        return Err(AppError::BadRequest(format!(
            "yield_gap_factor must be between {} and {}, got {}",
            YIELD_GAP_RANGE.start(),
            YIELD_GAP_RANGE.end(),
            factor
        )));
    }
    Ok(factor)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Start a scenario batch.
///
/// The request is resolved against the catalog first; configuration errors
/// are returned as 400 and nothing is started.
#[utoipa::path(
    post,
    path = "/api/v1/batches",
    tag = "Batches",
    request_body = BatchRequest,
    responses(
        (status = 202, description = "Batch started", body = BatchAccepted),
        (status = 400, description = "Invalid batch configuration", body = ErrorResponse),
    )
)]
pub async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<(StatusCode, Json<BatchAccepted>), AppError> {
    let plan = BatchPlan::resolve(&state.catalog, &request)?;
    let scenarios = plan.enabled_scenarios().count();

    let id = Uuid::new_v4();
    register_batch(
        &state.batches,
        BatchStatus::new(id, &plan.crop.key, &plan.location.key),
    )
    .await;

    tracing::info!(
        "Batch {} accepted: {} at {}, {} scenarios",
        id,
        plan.crop.key,
        plan.location.key,
        scenarios
    );

    let events = spawn_batch(
        plan,
        state.engine.clone(),
        state.weather.clone(),
        state.engine_slot.clone(),
    );
    tokio::spawn(track_batch(state.batches.clone(), id, events));

    Ok((StatusCode::ACCEPTED, Json(BatchAccepted { id, scenarios })))
}

/// Get a batch's state and last progress report.
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}",
    tag = "Batches",
    params(
        ("id" = Uuid, Path, description = "Batch ID"),
    ),
    responses(
        (status = 200, description = "Batch status", body = BatchStatus),
        (status = 404, description = "Batch not found", body = ErrorResponse),
    )
)]
pub async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchStatus>, AppError> {
    let batches = state.batches.read().await;
    batches
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Batch {} not found", id)))
}

/// Get the summary table of a completed batch.
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}/summary",
    tag = "Batches",
    params(
        ("id" = Uuid, Path, description = "Batch ID"),
        SummaryQuery,
    ),
    responses(
        (status = 200, description = "Summary rows in processing order", body = SummaryResponse),
        (status = 400, description = "Invalid yield gap factor", body = ErrorResponse),
        (status = 404, description = "Batch not found", body = ErrorResponse),
        (status = 409, description = "Batch not completed", body = ErrorResponse),
    )
)]
pub async fn get_batch_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>, AppError> {
    let factor = yield_gap_factor(&query)?;
    let result = completed_result(&state, id).await?;

    Ok(Json(SummaryResponse {
        yield_gap_factor: factor,
        phases: result
            .phenology
            .as_ref()
            .map(report::phase_boundaries)
            .unwrap_or_default(),
        rows: report::summary_rows(&result, factor),
        skipped: result.skipped.clone(),
    }))
}

/// Get one scenario's daily output table, GDD columns included.
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}/outputs/{scenario}",
    tag = "Batches",
    params(
        ("id" = Uuid, Path, description = "Batch ID"),
        ("scenario" = String, Path, description = "Scenario display name"),
    ),
    responses(
        (status = 200, description = "Daily output table", body = ScenarioOutputResponse),
        (status = 404, description = "Batch or scenario not found", body = ErrorResponse),
        (status = 409, description = "Batch not completed", body = ErrorResponse),
    )
)]
pub async fn get_scenario_output(
    State(state): State<AppState>,
    Path((id, scenario)): Path<(Uuid, String)>,
) -> Result<Json<ScenarioOutputResponse>, AppError> {
    let result = completed_result(&state, id).await?;
    let table = result.outputs.get(&scenario).cloned().ok_or_else(|| {
        AppError::NotFound(format!("No output for scenario '{}' in batch {}", scenario, id))
    })?;

    let variables = table.column_names().map(str::to_string).collect();
    Ok(Json(ScenarioOutputResponse {
        scenario,
        variables,
        table,
    }))
}

/// Get the daily weather of the planting year.
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}/weather",
    tag = "Batches",
    params(
        ("id" = Uuid, Path, description = "Batch ID"),
    ),
    responses(
        (status = 200, description = "Daily weather", body = WeatherResponse),
        (status = 404, description = "Batch not found", body = ErrorResponse),
        (status = 409, description = "Batch not completed", body = ErrorResponse),
    )
)]
pub async fn get_batch_weather(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WeatherResponse>, AppError> {
    let result = completed_result(&state, id).await?;
    Ok(Json(WeatherResponse {
        location_name: result.location_name.clone(),
        year: result.weather_year,
        days: result.weather.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_state;
    use crate::services::testing::FakeEngine;
    use std::time::Duration;

    fn request(crop: &str) -> BatchRequest {
        serde_json::from_value(serde_json::json!({
            "crop": crop,
            "location": "narok",
        }))
        .unwrap()
    }

    async fn wait_until_done(state: &AppState, id: Uuid) -> BatchStatus {
        for _ in 0..200 {
            let Json(status) = get_batch(State(state.clone()), Path(id)).await.unwrap();
            if status.state != BatchState::Running {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch {} did not finish", id);
    }

    #[tokio::test]
    async fn test_create_batch_runs_to_completion() {
        let state = test_state::with_engine(FakeEngine::new(200));
        let (code, Json(accepted)) = create_batch(State(state.clone()), Json(request("barley")))
            .await
            .unwrap();
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(accepted.scenarios, 5);

        let status = wait_until_done(&state, accepted.id).await;
        assert_eq!(status.state, BatchState::Completed);
        assert_eq!(status.percent, 100);
        assert_eq!(status.message, "Done!");
        assert_eq!(status.scenarios_completed, Some(5));

        let Json(summary) = get_batch_summary(
            State(state.clone()),
            Path(accepted.id),
            Query(SummaryQuery { yield_gap_factor: Some(0.5) }),
        )
        .await
        .unwrap();
        assert_eq!(summary.rows.len(), 5);
        assert_eq!(summary.rows[0].scenario, "No Fertilizer");
        assert_eq!(summary.rows[0].actual_yield_t, summary.rows[0].yield_t * 0.5);
        assert!(summary.rows[0].total_gdd.is_some());
        assert_eq!(summary.phases.len(), 7);
        assert!(summary.rows[0].phase_reached.is_some());

        let Json(output) = get_scenario_output(
            State(state.clone()),
            Path((accepted.id, "No Fertilizer".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(output.table.len(), 200);
        assert!(output.table.column("daily_GDD").is_some());
        assert_eq!(output.variables, vec!["DVS", "GDD", "LAI", "daily_GDD"]);

        let Json(weather) = get_batch_weather(State(state), Path(accepted.id)).await.unwrap();
        assert_eq!(weather.year, 2023);
        assert_eq!(weather.days.len(), 365);
    }

    #[tokio::test]
    async fn test_create_batch_rejects_unknown_crop() {
        let state = test_state::with_engine(FakeEngine::new(10));
        let err = create_batch(State(state.clone()), Json(request("maize")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(state.batches.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_reports_error() {
        let state = test_state::with_engine(FakeEngine::new(10).unavailable());
        let (_, Json(accepted)) = create_batch(State(state.clone()), Json(request("potato")))
            .await
            .unwrap();

        let status = wait_until_done(&state, accepted.id).await;
        assert_eq!(status.state, BatchState::Failed);
        assert!(status.error.unwrap().contains("Engine unavailable"));

        let err = get_batch_weather(State(state), Path(accepted.id)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unknown_batch_and_scenario() {
        let state = test_state::with_engine(FakeEngine::new(20).failing_on_call(1));
        let err = get_batch(State(state.clone()), Path(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let (_, Json(accepted)) = create_batch(State(state.clone()), Json(request("barley")))
            .await
            .unwrap();
        let status = wait_until_done(&state, accepted.id).await;
        assert_eq!(status.skipped.len(), 1);
        assert_eq!(status.skipped[0].scenario, "Low (25 kg N/ha)");

        let err = get_scenario_output(
            State(state),
            Path((accepted.id, "Low (25 kg N/ha)".to_string())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_yield_gap_factor_validation() {
        assert_eq!(yield_gap_factor(&SummaryQuery { yield_gap_factor: None }).unwrap(), 0.35);
        assert_eq!(yield_gap_factor(&SummaryQuery { yield_gap_factor: Some(1.0) }).unwrap(), 1.0);
        assert!(yield_gap_factor(&SummaryQuery { yield_gap_factor: Some(0.05) }).is_err());
        assert!(yield_gap_factor(&SummaryQuery { yield_gap_factor: Some(f64::NAN) }).is_err());
    }

    #[tokio::test]
    async fn test_concurrent_batches_run_engine_one_at_a_time() {
        let engine = Arc::new(FakeEngine::new(30).with_delay(Duration::from_millis(20)));
        let state = test_state::with_shared_engine(engine.clone());

        let (_, Json(first)) = create_batch(State(state.clone()), Json(request("barley")))
            .await
            .unwrap();
        let (_, Json(second)) = create_batch(State(state.clone()), Json(request("potato")))
            .await
            .unwrap();

        assert_eq!(wait_until_done(&state, first.id).await.state, BatchState::Completed);
        assert_eq!(wait_until_done(&state, second.id).await.state, BatchState::Completed);
        assert_eq!(engine.calls(), 10);
        assert_eq!(engine.peak_in_flight(), 1);
    }
}
