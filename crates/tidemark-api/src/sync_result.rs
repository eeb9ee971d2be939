//! Per-entity sync results and the aggregated run summary

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::SyncError;

/// Outcome of syncing one entity
///
/// Construct through `synced`, `unchanged` or `failed` so the count
/// invariants hold: a failed result and an unchanged result both carry zero
/// for both counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub entity_name: String,
    pub new_record_count: usize,
    pub total_record_count: usize,
    pub succeeded: bool,
    pub error_message: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl SyncResult {
    /// Snapshot written with `total` records, `new` of which were in the delta
    pub fn synced(entity_name: impl Into<String>, new: usize, total: usize) -> Self {
        Self {
            entity_name: entity_name.into(),
            new_record_count: new,
            total_record_count: total,
            succeeded: true,
            error_message: None,
            duration_ms: 0,
        }
    }

    /// Delta was empty: nothing written, watermark untouched
    pub fn unchanged(entity_name: impl Into<String>) -> Self {
        Self::synced(entity_name, 0, 0)
    }

    pub fn failed(entity_name: impl Into<String>, error: &SyncError) -> Self {
        Self {
            entity_name: entity_name.into(),
            new_record_count: 0,
            total_record_count: 0,
            succeeded: false,
            error_message: Some(error.to_string()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = elapsed.as_millis() as u64;
        self
    }

    /// True for the "nothing changed, upload skipped" case
    pub fn is_unchanged(&self) -> bool {
        self.succeeded && self.new_record_count == 0
    }

    fn report_line(&self) -> String {
        let glyph = if self.succeeded { "✓" } else { "✗" };
        let mut line = format!(
            "{} {}: {} new / {} total",
            glyph, self.entity_name, self.new_record_count, self.total_record_count
        );
        if let Some(error) = &self.error_message {
            line.push_str(" - ");
            line.push_str(error);
        }
        line
    }
}

/// Results of one pass over every registered entity, in registration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub results: Vec<SyncResult>,
    pub total_new_records: usize,
    pub entities_succeeded: usize,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, results: Vec<SyncResult>) -> Self {
        let total_new_records = results.iter().map(|r| r.new_record_count).sum();
        let entities_succeeded = results.iter().filter(|r| r.succeeded).count();
        Self {
            started_at,
            results,
            total_new_records,
            entities_succeeded,
        }
    }

    pub fn entities_failed(&self) -> usize {
        self.results.len() - self.entities_succeeded
    }

    pub fn all_succeeded(&self) -> bool {
        self.entities_failed() == 0
    }

    pub fn result_for(&self, entity_name: &str) -> Option<&SyncResult> {
        self.results.iter().find(|r| r.entity_name == entity_name)
    }

    /// Human-readable report, one line per entity between a header and a totals line
    pub fn report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Sync run started {}",
            self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        for result in &self.results {
            writeln!(f, "  {}", result.report_line())?;
        }
        write!(
            f,
            "Total: {} new records, {}/{} entities synced",
            self.total_new_records,
            self.entities_succeeded,
            self.results.len()
        )
    }
}
