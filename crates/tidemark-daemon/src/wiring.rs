//! Builds the scheduler and its collaborators from configuration

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use tidemark::config::{SinkConfig, TidemarkConfig, WatermarkConfig};
use tidemark::core::clock::SystemClock;
use tidemark::core::datasource::{SnapshotSink, WatermarkStore};
use tidemark::sink::{FilesystemSink, MemorySink};
use tidemark::storage::{
    InMemoryWatermarkStore, LibsqlBackend, LibsqlRecordSource, LibsqlWatermarkStore,
};
use tidemark::{EntityRegistry, Scheduler, SyncCoordinator, SyncExecutor};
use tidemark_gcs::GcsSink;

/// Configuration file when given, otherwise built-in defaults; environment
/// overrides apply either way
pub fn load_config(path: Option<&Path>) -> Result<TidemarkConfig> {
    match path {
        Some(path) => TidemarkConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let mut config = TidemarkConfig::default();
            config
                .apply_overrides(|key| std::env::var(key).ok())
                .context("Invalid environment override")?;
            config
                .validate()
                .context("Default configuration is invalid after environment overrides")?;
            Ok(config)
        }
    }
}

pub async fn build_scheduler(config: &TidemarkConfig) -> Result<Scheduler> {
    let source = LibsqlBackend::open(&config.source.url, config.source.auth_token.as_deref())
        .await
        .with_context(|| format!("Failed to open source database {}", config.source.url))?;
    let source = Arc::new(LibsqlRecordSource::new(Arc::new(source)));

    // An invalid registry is a deployment error: fail before any run starts
    let registry = EntityRegistry::from_config(&config.entities, source)
        .context("Invalid entity registry")?;
    info!("Registered entities: {}", registry.names().join(", "));

    let executor = SyncExecutor::new(
        build_watermark_store(&config.watermarks).await?,
        build_sink(&config.sink)?,
        Arc::new(SystemClock),
    )
    .with_blob_prefix(config.sync.blob_prefix.clone())
    .with_call_timeout(config.sync.call_timeout());

    let coordinator = SyncCoordinator::new(Arc::new(registry), executor);
    Ok(Scheduler::new(coordinator, config.schedule.interval())
        .with_run_on_start(config.schedule.run_on_start))
}

async fn build_watermark_store(config: &WatermarkConfig) -> Result<Arc<dyn WatermarkStore>> {
    match config {
        WatermarkConfig::Memory => {
            warn!("Watermarks are kept in memory; every restart re-syncs all entities");
            Ok(Arc::new(InMemoryWatermarkStore::new()))
        }
        WatermarkConfig::Libsql { url } => {
            let backend = LibsqlBackend::open(url, None)
                .await
                .with_context(|| format!("Failed to open watermark database {}", url))?;
            let store = LibsqlWatermarkStore::new(Arc::new(backend));
            store
                .initialize()
                .await
                .context("Failed to initialize watermark table")?;
            Ok(Arc::new(store))
        }
    }
}

fn build_sink(config: &SinkConfig) -> Result<Arc<dyn SnapshotSink>> {
    Ok(match config {
        SinkConfig::Filesystem { root } => {
            info!("Writing snapshots under {}", root.display());
            Arc::new(FilesystemSink::new(root.clone()))
        }
        SinkConfig::Gcs {
            bucket,
            endpoint,
            access_token,
        } => {
            if access_token.is_none() {
                warn!("No GCS access token configured; uploads are anonymous");
            }
            let mut sink = GcsSink::new(bucket.clone(), access_token.clone())
                .context("Failed to create GCS sink")?;
            if let Some(endpoint) = endpoint {
                sink = sink.with_endpoint(endpoint.clone());
            }
            info!("Uploading snapshots to gs://{}", bucket);
            Arc::new(sink)
        }
        SinkConfig::Memory => {
            warn!("Snapshots are kept in memory and discarded on exit");
            Arc::new(MemorySink::new())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark::SchedulerState;

    #[tokio::test]
    async fn test_build_scheduler_from_local_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let yaml = format!(
            r#"
schedule:
  interval_secs: 3600
  run_on_start: false
source:
  url: "file:{source}"
sink:
  kind: filesystem
  root: "{root}"
watermarks:
  kind: libsql
  url: "file:{state}"
entities:
  - name: incidents
    cursor_field: created_at
"#,
            source = dir.path().join("risk.db").display(),
            root = dir.path().join("bucket").display(),
            state = dir.path().join("state.db").display(),
        );
        let config = TidemarkConfig::from_yaml_str(&yaml)?;
        config.validate()?;

        let scheduler = build_scheduler(&config).await?;
        assert_eq!(scheduler.interval(), std::time::Duration::from_secs(3600));

        let status = scheduler.status().await?;
        assert_eq!(status.state, SchedulerState::Idle);
        assert_eq!(status.watermarks.len(), 1);
        assert_eq!(status.next_sync_in, std::time::Duration::ZERO);
        Ok(())
    }
}
