//! In-memory snapshot sink
//!
//! Records every write for later assertion and can be told to fail writes to
//! specific blobs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::datasource::{Result, SnapshotSink};
use tidemark_api::{BlobMetadata, Record, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub content: Vec<u8>,
    pub metadata: BlobMetadata,
}

impl StoredSnapshot {
    /// Decode the blob back into records
    pub fn records(&self) -> Result<Vec<Record>> {
        Ok(serde_json::from_slice(&self.content)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    blobs: Arc<Mutex<HashMap<String, StoredSnapshot>>>,
    writes: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashMap<String, SyncError>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `blob_name` fail with `error`
    pub fn fail_writes_to(&self, blob_name: impl Into<String>, error: SyncError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(blob_name.into(), error);
    }

    pub fn clear_failures(&self) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn get(&self, blob_name: &str) -> Option<StoredSnapshot> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(blob_name)
            .cloned()
    }

    /// Blob names of successful writes, in write order
    pub fn writes(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl SnapshotSink for MemorySink {
    async fn write_snapshot(
        &self,
        blob_name: &str,
        content: Vec<u8>,
        metadata: &BlobMetadata,
    ) -> Result<()> {
        if let Some(error) = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(blob_name)
        {
            return Err(error.clone());
        }

        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                blob_name.to_string(),
                StoredSnapshot {
                    content,
                    metadata: metadata.clone(),
                },
            );
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(blob_name.to_string());
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_write_replaces_previous_blob() {
        let sink = MemorySink::new();
        let metadata = BlobMetadata::new(Utc::now(), 1, 1);

        sink.write_snapshot("sync/incidents.json", b"[{\"id\":1}]".to_vec(), &metadata)
            .await
            .unwrap();
        sink.write_snapshot("sync/incidents.json", b"[]".to_vec(), &metadata)
            .await
            .unwrap();

        let stored = sink.get("sync/incidents.json").unwrap();
        assert!(stored.records().unwrap().is_empty());
        assert_eq!(sink.write_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure_is_returned_and_not_recorded() {
        let sink = MemorySink::new();
        sink.fail_writes_to(
            "sync/vulnerabilities.json",
            SyncError::sink_unavailable("bucket offline"),
        );

        let err = sink
            .write_snapshot(
                "sync/vulnerabilities.json",
                b"[]".to_vec(),
                &BlobMetadata::new(Utc::now(), 0, 0),
            )
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::sink_unavailable("bucket offline"));
        assert!(sink.get("sync/vulnerabilities.json").is_none());
        assert_eq!(sink.write_count(), 0);

        sink.clear_failures();
        sink.write_snapshot(
            "sync/vulnerabilities.json",
            b"[]".to_vec(),
            &BlobMetadata::new(Utc::now(), 0, 0),
        )
        .await
        .unwrap();
        assert_eq!(sink.writes(), vec!["sync/vulnerabilities.json".to_string()]);
    }
}
