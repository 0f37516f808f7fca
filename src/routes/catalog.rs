//! Read-only catalog tables.

use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::catalog::models::{CropProfile, FertilizerScenario, Location, SoilProfile};

/// List crop profiles.
#[utoipa::path(
    get,
    path = "/api/v1/crops",
    tag = "Catalog",
    responses(
        (status = 200, description = "Crop profiles", body = Vec<CropProfile>),
    )
)]
pub async fn list_crops(State(state): State<AppState>) -> Json<Vec<CropProfile>> {
    Json(state.catalog.crops().to_vec())
}

/// List locations.
#[utoipa::path(
    get,
    path = "/api/v1/locations",
    tag = "Catalog",
    responses(
        (status = 200, description = "Locations", body = Vec<Location>),
    )
)]
pub async fn list_locations(State(state): State<AppState>) -> Json<Vec<Location>> {
    Json(state.catalog.locations().to_vec())
}

/// List soil profiles.
#[utoipa::path(
    get,
    path = "/api/v1/soils",
    tag = "Catalog",
    responses(
        (status = 200, description = "Soil profiles", body = Vec<SoilProfile>),
    )
)]
pub async fn list_soils(State(state): State<AppState>) -> Json<Vec<SoilProfile>> {
    Json(state.catalog.soils().to_vec())
}

/// List the default fertilizer scenarios, in run order.
#[utoipa::path(
    get,
    path = "/api/v1/scenarios",
    tag = "Catalog",
    responses(
        (status = 200, description = "Fertilizer scenarios", body = Vec<FertilizerScenario>),
    )
)]
pub async fn list_scenarios(State(state): State<AppState>) -> Json<Vec<FertilizerScenario>> {
    Json(state.catalog.scenarios().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_state;
    use crate::services::testing::FakeEngine;

    #[tokio::test]
    async fn test_catalog_tables() {
        let state = test_state::with_engine(FakeEngine::new(10));

        let Json(crops) = list_crops(State(state.clone())).await;
        assert_eq!(crops.len(), 5);

        let Json(locations) = list_locations(State(state.clone())).await;
        assert_eq!(locations.len(), 7);

        let Json(soils) = list_soils(State(state.clone())).await;
        assert_eq!(soils[0].key, "nitisol");

        let Json(scenarios) = list_scenarios(State(state)).await;
        let keys: Vec<&str> = scenarios.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["none", "low", "medium", "recommended", "high"]);
    }
}
