//! In-memory batch status, fed by each batch's event stream.
//!
//! Every spawned batch gets one tracking task (`track_batch`) that is the sole
//! consumer of its events and folds them into a `BatchStatus`. Running batches
//! are always kept; only the most recent `MAX_FINISHED_BATCHES` finished ones
//! (with their output tables) stay in memory.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::aggregator::{BatchResult, SkippedScenario};
use crate::services::scheduler::BatchEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Running,
    Completed,
    Failed,
}

/// Status of one batch, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchStatus {
    pub id: Uuid,
    pub state: BatchState,
    /// Last reported progress (0-100)
    pub percent: u8,
    /// Last progress message
    pub message: String,
    pub crop: String,
    pub location: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Fatal error, when `state` is "failed"
    pub error: Option<String>,
    /// Number of successful scenarios, once completed
    pub scenarios_completed: Option<usize>,
    pub skipped: Vec<SkippedScenario>,
    #[serde(skip)]
    pub result: Option<Arc<BatchResult>>,
}

impl BatchStatus {
    pub fn new(id: Uuid, crop: &str, location: &str) -> Self {
        Self {
            id,
            state: BatchState::Running,
            percent: 0,
            message: "Queued".to_string(),
            crop: crop.to_string(),
            location: location.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
            scenarios_completed: None,
            skipped: Vec::new(),
            result: None,
        }
    }

    /// Fold one event into the status.
    pub fn apply(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::Progress { percent, message } => {
                self.percent = percent;
                self.message = message;
            }
            BatchEvent::Completed(result) => {
                self.state = BatchState::Completed;
                self.finished_at = Some(Utc::now());
                self.scenarios_completed = Some(result.results.len());
                self.skipped = result.skipped.clone();
                self.result = Some(Arc::from(result));
            }
            BatchEvent::Failed(error) => {
                self.state = BatchState::Failed;
                self.finished_at = Some(Utc::now());
                self.error = Some(error.to_string());
            }
        }
    }
}

/// Shared batch status handle.
pub type SharedBatches = Arc<RwLock<HashMap<Uuid, BatchStatus>>>;

/// Finished batches retained for result queries.
pub const MAX_FINISHED_BATCHES: usize = 50;

/// Add a new batch, dropping the oldest finished ones beyond the limit.
pub async fn register_batch(batches: &SharedBatches, status: BatchStatus) {
    let mut map = batches.write().await;
    map.insert(status.id, status);
    prune_finished(&mut map, MAX_FINISHED_BATCHES);
}

fn prune_finished(map: &mut HashMap<Uuid, BatchStatus>, keep: usize) {
    let mut finished: Vec<(DateTime<Utc>, Uuid)> = map
        .values()
        .filter_map(|s| s.finished_at.map(|at| (at, s.id)))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        map.remove(&id);
        tracing::debug!("Tracker: evicted finished batch {}", id);
    }
}

/// Consume a batch's events until the stream closes.
pub async fn track_batch(batches: SharedBatches, id: Uuid, mut events: UnboundedReceiver<BatchEvent>) {
    while let Some(event) = events.recv().await {
        let mut map = batches.write().await;
        match map.get_mut(&id) {
            Some(status) => status.apply(event),
            None => {
                tracing::warn!("Tracker: batch {} vanished, dropping its events", id);
                return;
            }
        }
    }

    let mut map = batches.write().await;
    let Some(status) = map.get_mut(&id) else {
        return;
    };
    if status.state == BatchState::Running {
        // The batch task ended without a terminal event (it panicked).
        status.state = BatchState::Failed;
        status.finished_at = Some(Utc::now());
        status.error = Some("Batch terminated unexpectedly".to_string());
        tracing::error!("Tracker: batch {} ended without a result", id);
    } else {
        tracing::info!("Tracker: batch {} finished as {:?}", id, status.state);
    }
}
