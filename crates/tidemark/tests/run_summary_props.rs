//! Run-level invariants over arbitrary registries: one result per entity in
//! registration order, and totals that agree with the per-entity results.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::Arc;

use tidemark::core::datasource::DeltaFetcher;
use tidemark::sink::MemorySink;
use tidemark::storage::InMemoryWatermarkStore;
use tidemark::testing::{incident_records, FailingFetcher, ManualClock, TimestampedTable};
use tidemark::{EntityDescriptor, EntityRegistry, SyncCoordinator, SyncError, SyncExecutor};

#[derive(Debug, Clone)]
enum EntityPlan {
    Rows(usize),
    Broken,
}

fn plan_strategy() -> impl Strategy<Value = Vec<EntityPlan>> {
    prop::collection::vec(
        prop_oneof![
            4 => (0usize..25).prop_map(EntityPlan::Rows),
            1 => Just(EntityPlan::Broken),
        ],
        1..10,
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_summary_matches_results(plans in plan_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();

        let mut builder = EntityRegistry::builder();
        for (idx, plan) in plans.iter().enumerate() {
            let fetcher: Arc<dyn DeltaFetcher> = match plan {
                EntityPlan::Rows(count) => Arc::new(TimestampedTable::new(
                    "created_at",
                    incident_records(*count, now - Duration::minutes(5)),
                )),
                EntityPlan::Broken => Arc::new(FailingFetcher::new(
                    SyncError::source_unavailable("replica down"),
                )),
            };
            builder = builder.register(
                EntityDescriptor::new(format!("entity_{idx}"), "created_at"),
                fetcher,
            );
        }
        let registry = builder.build().unwrap();

        let sink = MemorySink::new();
        let executor = SyncExecutor::new(
            Arc::new(InMemoryWatermarkStore::new()),
            Arc::new(sink.clone()),
            Arc::new(ManualClock::new(now)),
        );
        let coordinator = SyncCoordinator::new(Arc::new(registry), executor);

        let summary = rt.block_on(coordinator.run_sync());

        prop_assert_eq!(summary.results.len(), plans.len());
        for (idx, result) in summary.results.iter().enumerate() {
            prop_assert_eq!(&result.entity_name, &format!("entity_{idx}"));
        }

        let expected_new: usize = summary.results.iter().map(|r| r.new_record_count).sum();
        prop_assert_eq!(summary.total_new_records, expected_new);

        let expected_ok = plans.iter().filter(|p| matches!(p, EntityPlan::Rows(_))).count();
        prop_assert_eq!(summary.entities_succeeded, expected_ok);

        let expected_writes = plans
            .iter()
            .filter(|p| matches!(p, EntityPlan::Rows(n) if *n > 0))
            .count();
        prop_assert_eq!(sink.write_count(), expected_writes);

        for result in summary.results.iter().filter(|r| !r.succeeded) {
            prop_assert_eq!(result.new_record_count, 0);
            prop_assert_eq!(result.total_record_count, 0);
            prop_assert!(result.error_message.is_some());
        }

        let report = summary.report();
        prop_assert_eq!(report.lines().count(), plans.len() + 2);
    }
}
