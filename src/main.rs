// Farm Twin API v0.1
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod catalog;
mod config;
mod errors;
mod helpers;
mod routes;
mod services;

use catalog::Catalog;
use config::AppConfig;
use routes::AppState;
use services::engine::{CropEngine, SubprocessEngine};
use services::weather::FileWeatherSource;

/// Farm Twin API OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Farm Twin API",
        version = "0.1.0",
        description = "Nitrogen fertilizer scenario batches for an external crop-growth \
            simulator. Builds management calendars per scenario, runs them sequentially, \
            attaches growing degree days to each daily output and reports yield, biomass \
            and phenology per scenario.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Catalog", description = "Crops, locations, soils and default scenarios"),
        (name = "Batches", description = "Scenario batch submission and results"),
    ),
    paths(
        routes::health::health_check,
        routes::catalog::list_crops,
        routes::catalog::list_locations,
        routes::catalog::list_soils,
        routes::catalog::list_scenarios,
        routes::batches::create_batch,
        routes::batches::get_batch,
        routes::batches::get_batch_summary,
        routes::batches::get_scenario_output,
        routes::batches::get_batch_weather,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            catalog::models::CropProfile,
            catalog::models::PhenologyTable,
            catalog::models::Phenophase,
            catalog::models::Location,
            catalog::models::SoilProfile,
            catalog::models::SoilParams,
            catalog::models::FertilizerScenario,
            catalog::models::Application,
            services::scheduler::BatchRequest,
            services::tracker::BatchStatus,
            services::tracker::BatchState,
            services::aggregator::SkippedScenario,
            services::report::SummaryRow,
            services::report::PhaseBoundary,
            services::weather::WeatherSample,
            routes::batches::BatchAccepted,
            routes::batches::SummaryResponse,
            routes::batches::ScenarioOutputResponse,
            routes::batches::WeatherResponse,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "farm_twin_api=debug,tower_http=debug".into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Catalog: built-in presets, replaced table by table from DATA_DIR
    let data_dir = Path::new(&config.data_dir);
    let catalog = Catalog::load(data_dir).expect("Failed to load catalog");
    tracing::info!(
        "Catalog loaded: {} crops, {} locations, {} soils, {} scenarios",
        catalog.crops().len(),
        catalog.locations().len(),
        catalog.soils().len(),
        catalog.scenarios().len()
    );

    let engine = SubprocessEngine::new(&config.engine_command).expect("Invalid ENGINE_COMMAND");
    if let Err(e) = engine.check_available() {
        // Batches fail at setup until the engine is installed.
        tracing::warn!("{}", e);
    }

    let app_state = AppState {
        catalog: Arc::new(catalog),
        engine: Arc::new(engine),
        weather: Arc::new(FileWeatherSource::new(&config.weather_dir)),
        engine_slot: Default::default(),
        batches: Default::default(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/crops", get(routes::catalog::list_crops))
        .route("/api/v1/locations", get(routes::catalog::list_locations))
        .route("/api/v1/soils", get(routes::catalog::list_soils))
        .route("/api/v1/scenarios", get(routes::catalog::list_scenarios))
        .route("/api/v1/batches", post(routes::batches::create_batch))
        .route("/api/v1/batches/:id", get(routes::batches::get_batch))
        .route(
            "/api/v1/batches/:id/summary",
            get(routes::batches::get_batch_summary),
        )
        .route(
            "/api/v1/batches/:id/outputs/:scenario",
            get(routes::batches::get_scenario_output),
        )
        .route(
            "/api/v1/batches/:id/weather",
            get(routes::batches::get_batch_weather),
        )
        .with_state(app_state);

    let app = Router::new()
        .merge(api_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
