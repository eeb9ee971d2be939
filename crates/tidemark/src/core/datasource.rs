//! Boundary traits between the sync pipeline and its external collaborators
//!
//! - `DeltaFetcher`: records of one entity created/updated since a watermark
//! - `RecordSource`: a relational store that can serve any table as a delta
//! - `WatermarkStore`: last successful sync time per entity
//! - `SnapshotSink`: object storage receiving full snapshots
//!
//! Every method reports failures as `SyncError` so the executor can capture
//! them into a per-entity result instead of aborting the run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use tidemark_api::{BlobMetadata, Record, SyncError};

pub type Result<T> = std::result::Result<T, SyncError>;

/// Fetches records for one entity
///
/// `since = None` means "all records"; otherwise only records whose cursor
/// field is strictly later than `since`.
#[async_trait]
pub trait DeltaFetcher: Send + Sync {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Record>>;
}

/// Relational store able to serve a delta query against any table
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_records(
        &self,
        table: &str,
        cursor_field: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>>;
}

/// `DeltaFetcher` bound to one table of a shared `RecordSource`
pub struct TableFetcher {
    source: Arc<dyn RecordSource>,
    table: String,
    cursor_field: String,
}

impl TableFetcher {
    pub fn new(
        source: Arc<dyn RecordSource>,
        table: impl Into<String>,
        cursor_field: impl Into<String>,
    ) -> Self {
        Self {
            source,
            table: table.into(),
            cursor_field: cursor_field.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl DeltaFetcher for TableFetcher {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Record>> {
        self.source
            .fetch_records(&self.table, &self.cursor_field, since)
            .await
    }
}

/// Per-entity checkpoint of the last successful sync
///
/// Returns `None` from `load_watermark` when the entity was never synced.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn load_watermark(&self, entity_name: &str) -> Result<Option<DateTime<Utc>>>;

    async fn save_watermark(&self, entity_name: &str, synced_at: DateTime<Utc>) -> Result<()>;

    /// All recorded watermarks keyed by entity name
    async fn snapshot(&self) -> Result<BTreeMap<String, DateTime<Utc>>>;
}

/// Object storage receiving snapshot blobs
///
/// Writing an existing blob name replaces its content and metadata entirely.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn write_snapshot(
        &self,
        blob_name: &str,
        content: Vec<u8>,
        metadata: &BlobMetadata,
    ) -> Result<()>;

    /// Name used in log lines (e.g. "filesystem", "gcs")
    fn sink_name(&self) -> &str;
}
