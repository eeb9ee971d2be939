//! Watermark store implementations
//!
//! `LibsqlWatermarkStore` persists watermarks in the `sync_watermarks` table so
//! incremental syncs survive restarts. `InMemoryWatermarkStore` forgets
//! everything with the process and is meant for tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::datasource::{Result, WatermarkStore};
use crate::storage::backend::LibsqlBackend;
use tidemark_api::SyncError;

pub struct LibsqlWatermarkStore {
    backend: Arc<LibsqlBackend>,
}

impl LibsqlWatermarkStore {
    pub fn new(backend: Arc<LibsqlBackend>) -> Self {
        Self { backend }
    }

    /// Create the `sync_watermarks` table if it does not exist yet
    pub async fn initialize(&self) -> Result<()> {
        let create_table_sql = r#"
            CREATE TABLE IF NOT EXISTS sync_watermarks (
                entity_name TEXT PRIMARY KEY,
                watermark TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#;

        self.backend
            .connection()
            .execute(create_table_sql, ())
            .await
            .map_err(|e| {
                SyncError::checkpoint(format!("Failed to create sync_watermarks table: {}", e))
            })?;

        info!("[LibsqlWatermarkStore] sync_watermarks table initialized");
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for LibsqlWatermarkStore {
    async fn load_watermark(&self, entity_name: &str) -> Result<Option<DateTime<Utc>>> {
        let mut rows = self
            .backend
            .connection()
            .query(
                "SELECT watermark FROM sync_watermarks WHERE entity_name = ?1",
                libsql::params![entity_name.to_string()],
            )
            .await
            .map_err(|e| SyncError::checkpoint(format!("Failed to query watermark: {}", e)))?;

        let row = rows
            .next()
            .await
            .map_err(|e| SyncError::checkpoint(format!("Failed to read watermark row: {}", e)))?;

        let Some(row) = row else {
            debug!("[LibsqlWatermarkStore] No watermark for '{}'", entity_name);
            return Ok(None);
        };

        let raw: String = row
            .get(0)
            .map_err(|e| SyncError::checkpoint(format!("Failed to read watermark: {}", e)))?;
        parse_watermark(entity_name, &raw).map(Some)
    }

    async fn save_watermark(&self, entity_name: &str, synced_at: DateTime<Utc>) -> Result<()> {
        let sql = r#"
            INSERT INTO sync_watermarks (entity_name, watermark, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(entity_name) DO UPDATE SET
                watermark = excluded.watermark,
                updated_at = excluded.updated_at
        "#;
        let watermark = format_watermark(synced_at);

        self.backend
            .connection()
            .execute(sql, libsql::params![entity_name.to_string(), watermark.clone()])
            .await
            .map_err(|e| SyncError::checkpoint(format!("Failed to save watermark: {}", e)))?;

        debug!(
            "[LibsqlWatermarkStore] Saved watermark for '{}': {}",
            entity_name, watermark
        );
        Ok(())
    }

    async fn snapshot(&self) -> Result<BTreeMap<String, DateTime<Utc>>> {
        let mut rows = self
            .backend
            .connection()
            .query("SELECT entity_name, watermark FROM sync_watermarks", ())
            .await
            .map_err(|e| SyncError::checkpoint(format!("Failed to list watermarks: {}", e)))?;

        let mut watermarks = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| SyncError::checkpoint(format!("Failed to read watermark row: {}", e)))?
        {
            let name: String = row
                .get(0)
                .map_err(|e| SyncError::checkpoint(e.to_string()))?;
            let raw: String = row
                .get(1)
                .map_err(|e| SyncError::checkpoint(e.to_string()))?;
            let parsed = parse_watermark(&name, &raw)?;
            watermarks.insert(name, parsed);
        }
        Ok(watermarks)
    }
}

fn format_watermark(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_watermark(entity_name: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| {
            SyncError::checkpoint(format!(
                "Corrupt watermark for '{}' ({}): {}",
                entity_name, raw, e
            ))
        })
}

#[derive(Debug, Default)]
pub struct InMemoryWatermarkStore {
    watermarks: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn load_watermark(&self, entity_name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.watermarks.read().await.get(entity_name).copied())
    }

    async fn save_watermark(&self, entity_name: &str, synced_at: DateTime<Utc>) -> Result<()> {
        self.watermarks
            .write()
            .await
            .insert(entity_name.to_string(), synced_at);
        Ok(())
    }

    async fn snapshot(&self) -> Result<BTreeMap<String, DateTime<Utc>>> {
        Ok(self
            .watermarks
            .read()
            .await
            .iter()
            .map(|(name, at)| (name.clone(), *at))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_in_memory_store_round_trip() {
        let store = InMemoryWatermarkStore::new();
        assert_eq!(store.load_watermark("incidents").await.unwrap(), None);

        let at = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        store.save_watermark("incidents", at).await.unwrap();

        assert_eq!(store.load_watermark("incidents").await.unwrap(), Some(at));
        assert_eq!(store.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_libsql_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let url = path.to_string_lossy().to_string();
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 30, 0).unwrap()
            + chrono::Duration::microseconds(250);

        {
            let backend = Arc::new(LibsqlBackend::open(&url, None).await.unwrap());
            let store = LibsqlWatermarkStore::new(backend);
            store.initialize().await.unwrap();
            assert_eq!(store.load_watermark("violations").await.unwrap(), None);
            store.save_watermark("violations", at).await.unwrap();
        }

        let backend = Arc::new(LibsqlBackend::open(&url, None).await.unwrap());
        let store = LibsqlWatermarkStore::new(backend);
        store.initialize().await.unwrap();

        assert_eq!(store.load_watermark("violations").await.unwrap(), Some(at));
        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.get("violations"), Some(&at));
    }

    #[tokio::test]
    async fn test_libsql_store_overwrites_previous_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("state.db").to_string_lossy().to_string();
        let backend = Arc::new(LibsqlBackend::open(&url, None).await.unwrap());
        let store = LibsqlWatermarkStore::new(backend);
        store.initialize().await.unwrap();

        let first = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2026, 5, 2, 0, 0, 0).unwrap();
        store.save_watermark("incidents", first).await.unwrap();
        store.save_watermark("incidents", second).await.unwrap();

        assert_eq!(store.load_watermark("incidents").await.unwrap(), Some(second));
        assert_eq!(store.snapshot().await.unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_watermark_is_checkpoint_error() {
        let err = parse_watermark("incidents", "yesterday").unwrap_err();
        assert_eq!(err.kind(), "checkpoint");
    }
}
