use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler lifecycle. A failed run returns to `Idle` like any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Last successful sync time for one registered entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityWatermark {
    pub entity_name: String,
    /// `None` until the entity has been synced successfully once
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// One entry per registered entity, in registration order
    pub watermarks: Vec<EntityWatermark>,
    /// Zero means a run is due now
    pub next_sync_in: Duration,
    pub completed_runs: u64,
    pub last_run_started_at: Option<DateTime<Utc>>,
}

impl SchedulerStatus {
    pub fn watermark_for(&self, entity_name: &str) -> Option<DateTime<Utc>> {
        self.watermarks
            .iter()
            .find(|w| w.entity_name == entity_name)
            .and_then(|w| w.last_synced_at)
    }
}
