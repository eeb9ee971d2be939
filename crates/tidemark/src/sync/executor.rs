//! Sync executor: one entity, one cycle
//!
//! 1. Load the entity's watermark (absent on first run)
//! 2. Fetch the delta since the watermark; an empty delta ends the cycle
//!    without writing anything or moving the watermark
//! 3. Fetch the complete record set
//! 4. Serialize it and write the snapshot blob with its metadata
//! 5. Advance the watermark to the time the cycle started
//!
//! The delta only detects change. The blob always holds the full table, so
//! the sink never contains a partial merge.
//!
//! Every failure is captured into the returned `SyncResult`; nothing is
//! raised to the caller and the watermark stays where it was.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_BLOB_PREFIX, DEFAULT_CALL_TIMEOUT_SECS};
use crate::core::clock::Clock;
use crate::core::datasource::{DeltaFetcher, Result, SnapshotSink, WatermarkStore};
use tidemark_api::{BlobMetadata, EntityDescriptor, SyncError, SyncResult};

enum Outcome {
    Unchanged,
    Synced { new_records: usize, total_records: usize },
}

pub struct SyncExecutor {
    watermarks: Arc<dyn WatermarkStore>,
    sink: Arc<dyn SnapshotSink>,
    clock: Arc<dyn Clock>,
    blob_prefix: String,
    call_timeout: Duration,
}

impl SyncExecutor {
    pub fn new(
        watermarks: Arc<dyn WatermarkStore>,
        sink: Arc<dyn SnapshotSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            watermarks,
            sink,
            clock,
            blob_prefix: DEFAULT_BLOB_PREFIX.to_string(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_blob_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.blob_prefix = prefix.into();
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn watermarks(&self) -> &Arc<dyn WatermarkStore> {
        &self.watermarks
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// `<prefix>/<entity>.json`
    pub fn blob_name_for(&self, entity_name: &str) -> String {
        format!("{}/{}.json", self.blob_prefix, entity_name)
    }

    #[tracing::instrument(name = "sync.entity", skip(self, entity, fetcher), fields(entity = %entity.name))]
    pub async fn sync_entity(
        &self,
        entity: &EntityDescriptor,
        fetcher: &dyn DeltaFetcher,
    ) -> SyncResult {
        let started = Instant::now();

        let result = match self.run_cycle(entity, fetcher).await {
            Ok(Outcome::Unchanged) => {
                debug!("[SyncExecutor] No changes for {}, skipping upload", entity.name);
                SyncResult::unchanged(&entity.name)
            }
            Ok(Outcome::Synced {
                new_records,
                total_records,
            }) => {
                info!(
                    "[SyncExecutor] Synced {}: {} new, {} total via {} sink",
                    entity.name,
                    new_records,
                    total_records,
                    self.sink.sink_name()
                );
                SyncResult::synced(&entity.name, new_records, total_records)
            }
            Err(err) => {
                error!(
                    error.kind = err.kind(),
                    "[SyncExecutor] Sync failed for {}: {}", entity.name, err
                );
                SyncResult::failed(&entity.name, &err)
            }
        };

        result.with_duration(started.elapsed())
    }

    async fn run_cycle(
        &self,
        entity: &EntityDescriptor,
        fetcher: &dyn DeltaFetcher,
    ) -> Result<Outcome> {
        let now = self.clock.now();

        let since = self
            .bounded("load watermark", self.watermarks.load_watermark(&entity.name))
            .await?;

        let new_records = self
            .bounded("fetch delta", fetcher.fetch(since))
            .await?
            .len();
        if new_records == 0 {
            return Ok(Outcome::Unchanged);
        }

        let records = self.bounded("fetch full set", fetcher.fetch(None)).await?;
        let total_records = records.len();
        let content = serde_json::to_vec(&records)?;
        drop(records);

        let blob_name = self.blob_name_for(&entity.name);
        let metadata = BlobMetadata::new(now, total_records, new_records);
        self.bounded(
            "write snapshot",
            self.sink.write_snapshot(&blob_name, content, &metadata),
        )
        .await?;

        if let Some(previous) = since {
            if now <= previous {
                warn!(
                    "[SyncExecutor] Clock for {} did not advance past previous watermark {}",
                    entity.name, previous
                );
            }
        }
        self.bounded(
            "advance watermark",
            self.watermarks.save_watermark(&entity.name, now),
        )
        .await?;

        Ok(Outcome::Synced {
            new_records,
            total_records,
        })
    }

    /// Run one boundary call under the per-call deadline
    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                operation: operation.to_string(),
                after: self.call_timeout,
            }),
        }
    }
}
