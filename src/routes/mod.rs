pub mod batches;
pub mod catalog;
pub mod health;

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::services::engine::CropEngine;
use crate::services::scheduler::EngineSlot;
use crate::services::tracker::SharedBatches;
use crate::services::weather::WeatherSource;

/// Shared state for all handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) engine: Arc<dyn CropEngine>,
    pub(crate) weather: Arc<dyn WeatherSource>,
    /// Shared by all batches so only one drives the engine at a time.
    pub(crate) engine_slot: EngineSlot,
    pub(crate) batches: SharedBatches,
}
