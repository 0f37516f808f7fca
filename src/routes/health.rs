use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use super::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" when healthy, "degraded" when the engine cannot be found)
    pub status: String,
    /// API version
    pub version: String,
    /// Whether the crop-growth engine is available
    pub engine: bool,
}

/// Health check endpoint.
///
/// Returns status "degraded" (still 200) if the engine is unavailable, so
/// load balancers can distinguish partial failures.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    // The availability check touches the filesystem.
    let engine = state.engine.clone();
    let engine_ok = match tokio::task::spawn_blocking(move || engine.check_available()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!("Health: {}", e);
            false
        }
        Err(e) => {
            tracing::error!("Health: engine check aborted: {}", e);
            false
        }
    };

    Json(HealthResponse {
        status: if engine_ok { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: engine_ok,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_state;
    use crate::services::testing::FakeEngine;

    #[tokio::test]
    async fn test_health_ok() {
        let Json(resp) = health_check(State(test_state::with_engine(FakeEngine::new(10)))).await;
        assert_eq!(resp.status, "ok");
        assert!(resp.engine);
        assert!(!resp.version.is_empty());
    }

    #[tokio::test]
    async fn test_health_degraded_without_engine() {
        let state = test_state::with_engine(FakeEngine::new(10).unavailable());
        let Json(resp) = health_check(State(state)).await;
        assert_eq!(resp.status, "degraded");
        assert!(!resp.engine);
    }
}
