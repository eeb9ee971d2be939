use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};

use crate::core::datasource::{DeltaFetcher, Result};
use tidemark_api::{Record, SyncError};

/// In-memory table filtered on an RFC 3339 cursor field
///
/// Records whose cursor is missing or unparsable never appear in a delta,
/// only in the full set. Every `fetch` argument is recorded.
#[derive(Debug)]
pub struct TimestampedTable {
    cursor_field: String,
    records: Mutex<Vec<Record>>,
    calls: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl TimestampedTable {
    pub fn new(cursor_field: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            cursor_field: cursor_field.into(),
            records: Mutex::new(records),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, records: Vec<Record>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
    }

    pub fn fetch_calls(&self) -> Vec<Option<DateTime<Utc>>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn cursor_of(&self, record: &Record) -> Option<DateTime<Utc>> {
        record
            .get(&self.cursor_field)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[async_trait]
impl DeltaFetcher for TimestampedTable {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Record>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(since);

        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(match since {
            None => records.clone(),
            Some(since) => records
                .iter()
                .filter(|r| self.cursor_of(r).is_some_and(|at| at > since))
                .cloned()
                .collect(),
        })
    }
}

pub struct FailingFetcher {
    error: SyncError,
}

impl FailingFetcher {
    pub fn new(error: SyncError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl DeltaFetcher for FailingFetcher {
    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<Record>> {
        Err(self.error.clone())
    }
}

/// Never resolves; exercises the per-call deadline
pub struct HangingFetcher;

#[async_trait]
impl DeltaFetcher for HangingFetcher {
    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<Record>> {
        std::future::pending().await
    }
}

/// `count` incident rows, all created at `created_at`
pub fn incident_records(count: usize, created_at: DateTime<Utc>) -> Vec<Record> {
    let stamp = created_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    (1..=count)
        .map(|id| {
            let mut record = Record::new();
            record.insert("id".to_string(), Value::from(id));
            record.insert(
                "title".to_string(),
                Value::from(format!("Incident {}", id)),
            );
            record.insert("severity".to_string(), Value::from("high"));
            record.insert("created_at".to_string(), Value::from(stamp.clone()));
            record
        })
        .collect()
}
