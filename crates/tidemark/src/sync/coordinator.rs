//! Runs the executor across every registered entity
//!
//! Entities are synced one at a time in registration order. A failing entity
//! never stops the run; its failure is just another line in the summary.

use std::sync::Arc;
use tracing::info;

use crate::sync::executor::SyncExecutor;
use crate::sync::registry::EntityRegistry;
use tidemark_api::RunSummary;

pub struct SyncCoordinator {
    registry: Arc<EntityRegistry>,
    executor: SyncExecutor,
}

impl SyncCoordinator {
    pub fn new(registry: Arc<EntityRegistry>, executor: SyncExecutor) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &SyncExecutor {
        &self.executor
    }

    #[tracing::instrument(name = "sync.run", skip(self), fields(entities = self.registry.len()))]
    pub async fn run_sync(&self) -> RunSummary {
        let started_at = self.executor.clock().now();
        info!(
            "[SyncCoordinator] Starting sync of {} entities",
            self.registry.len()
        );

        let mut results = Vec::with_capacity(self.registry.len());
        for entity in self.registry.iter() {
            let result = self
                .executor
                .sync_entity(entity.descriptor(), entity.fetcher())
                .await;
            results.push(result);
        }

        let summary = RunSummary::new(started_at, results);
        for line in summary.report().lines() {
            info!("[SyncCoordinator] {}", line);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::datasource::{DeltaFetcher, WatermarkStore};
    use crate::sink::MemorySink;
    use crate::storage::InMemoryWatermarkStore;
    use crate::testing::{incident_records, FailingFetcher, ManualClock, TimestampedTable};
    use chrono::{TimeZone, Utc};
    use tidemark_api::{EntityDescriptor, SyncError};

    fn table(count: usize, at: chrono::DateTime<Utc>) -> Arc<dyn DeltaFetcher> {
        Arc::new(TimestampedTable::new("created_at", incident_records(count, at)))
    }

    #[tokio::test]
    async fn test_failure_in_one_entity_does_not_stop_the_run() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let watermarks = Arc::new(InMemoryWatermarkStore::new());
        let sink = MemorySink::new();

        let registry = EntityRegistry::builder()
            .register(EntityDescriptor::new("violations", "updated_at"), table(0, now))
            .register(EntityDescriptor::new("incidents", "created_at"), table(10, now))
            .register(
                EntityDescriptor::new("vulnerabilities", "created_at"),
                Arc::new(FailingFetcher::new(SyncError::query(
                    "no such table: vulnerabilities",
                ))),
            )
            .register(EntityDescriptor::new("research_papers", "created_at"), table(4, now))
            .build()
            .unwrap();

        let executor = SyncExecutor::new(watermarks.clone(), Arc::new(sink.clone()), clock);
        let coordinator = SyncCoordinator::new(Arc::new(registry), executor);

        let summary = coordinator.run_sync().await;

        let names: Vec<_> = summary.results.iter().map(|r| r.entity_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["violations", "incidents", "vulnerabilities", "research_papers"]
        );
        assert_eq!(summary.started_at, now);
        assert_eq!(summary.total_new_records, 14);
        assert_eq!(summary.entities_succeeded, 3);
        assert_eq!(summary.entities_failed(), 1);

        let failed = summary.result_for("vulnerabilities").unwrap();
        assert!(!failed.succeeded);
        assert!(failed.error_message.is_some());

        assert!(summary.result_for("violations").unwrap().is_unchanged());
        assert_eq!(
            sink.writes(),
            vec![
                "sync/incidents.json".to_string(),
                "sync/research_papers.json".to_string()
            ]
        );
        assert_eq!(watermarks.load_watermark("vulnerabilities").await.unwrap(), None);
        assert_eq!(watermarks.load_watermark("violations").await.unwrap(), None);
        assert_eq!(
            watermarks.load_watermark("incidents").await.unwrap(),
            Some(now)
        );
    }

    #[tokio::test]
    async fn test_write_failure_for_one_entity_keeps_its_watermark() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let watermarks = Arc::new(InMemoryWatermarkStore::new());
        let sink = MemorySink::new();
        sink.fail_writes_to(
            "sync/vulnerabilities.json",
            SyncError::sink_unavailable("bucket unreachable"),
        );

        let registry = EntityRegistry::builder()
            .register(EntityDescriptor::new("violations", "updated_at"), table(2, now))
            .register(
                EntityDescriptor::new("vulnerabilities", "created_at"),
                table(5, now),
            )
            .build()
            .unwrap();

        let executor = SyncExecutor::new(watermarks.clone(), Arc::new(sink.clone()), clock);
        let coordinator = SyncCoordinator::new(Arc::new(registry), executor);

        let summary = coordinator.run_sync().await;

        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.entities_succeeded, 1);
        assert_eq!(summary.entities_failed(), 1);

        let violations = summary.result_for("violations").unwrap();
        assert!(violations.succeeded);
        assert_eq!(violations.new_record_count, 2);

        let vulnerabilities = summary.result_for("vulnerabilities").unwrap();
        assert!(!vulnerabilities.succeeded);
        assert_eq!(vulnerabilities.new_record_count, 0);
        assert!(vulnerabilities
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("bucket unreachable")));

        assert_eq!(sink.writes(), vec!["sync/violations.json".to_string()]);
        assert!(sink.get("sync/vulnerabilities.json").is_none());
        assert_eq!(
            watermarks.load_watermark("violations").await.unwrap(),
            Some(now)
        );
        assert_eq!(
            watermarks.load_watermark("vulnerabilities").await.unwrap(),
            None
        );
    }
}
