//! Recurring trigger for sync runs
//!
//! `Idle -> Running -> Idle`. A run that fails for some or all entities still
//! returns to `Idle` and the next tick fires as usual.
//!
//! Scheduled and manual runs go through the same path and share one run
//! lock, so two runs never overlap: a manual trigger issued mid-run waits for
//! the scheduled run to finish, then performs its own.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::core::datasource::Result;
use crate::sync::coordinator::SyncCoordinator;
use tidemark_api::{EntityWatermark, RunSummary, SchedulerState, SchedulerStatus};

pub struct Scheduler {
    coordinator: SyncCoordinator,
    interval: Duration,
    run_on_start: bool,
    run_lock: tokio::sync::Mutex<()>,
    running: AtomicBool,
    completed_runs: AtomicU64,
    last_run_started_at: Mutex<Option<DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new(coordinator: SyncCoordinator, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
            run_on_start: true,
            run_lock: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
            completed_runs: AtomicU64::new(0),
            last_run_started_at: Mutex::new(None),
        }
    }

    /// Skip the immediate run at start-up and wait one full interval instead
    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn completed_runs(&self) -> u64 {
        self.completed_runs.load(Ordering::SeqCst)
    }

    /// Spawn the background loop on the current tokio runtime
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);

        let task = tokio::spawn(async move {
            // tokio::time::interval panics on a zero period
            let period = scheduler.interval.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // The first tick completes immediately
            if !scheduler.run_on_start {
                ticker.tick().await;
            }

            info!(
                "[Scheduler] Started, interval {:?}, run on start: {}",
                scheduler.interval, scheduler.run_on_start
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.execute("scheduled").await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("[Scheduler] Stopped");
        });

        SchedulerHandle { shutdown_tx, task }
    }

    /// Run a sync now, outside the schedule
    pub async fn trigger_manual_sync(&self) -> RunSummary {
        self.execute("manual").await
    }

    async fn execute(&self, trigger: &str) -> RunSummary {
        let _guard = self.run_lock.lock().await;

        let started_at = self.coordinator.executor().clock().now();
        let running = RunningFlag::raise(&self.running);
        *self
            .last_run_started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(started_at);
        info!("[Scheduler] Running {} sync", trigger);

        let summary = self.coordinator.run_sync().await;

        drop(running);
        self.completed_runs.fetch_add(1, Ordering::SeqCst);
        if !summary.all_succeeded() {
            warn!(
                "[Scheduler] {} sync finished with {} failed entities",
                trigger,
                summary.entities_failed()
            );
        }
        summary
    }

    pub async fn status(&self) -> Result<SchedulerStatus> {
        let recorded = self.coordinator.executor().watermarks().snapshot().await?;

        let watermarks: Vec<EntityWatermark> = self
            .coordinator
            .registry()
            .iter()
            .map(|entity| EntityWatermark {
                entity_name: entity.name().to_string(),
                last_synced_at: recorded.get(entity.name()).copied(),
            })
            .collect();

        let latest = watermarks.iter().filter_map(|w| w.last_synced_at).max();
        let now = self.coordinator.executor().clock().now();

        let state = if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        };

        Ok(SchedulerStatus {
            state,
            watermarks,
            next_sync_in: time_until_due(latest, self.interval, now),
            completed_runs: self.completed_runs(),
            last_run_started_at: *self
                .last_run_started_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        })
    }
}

/// Holds the running flag up until dropped, including when the run future is
/// cancelled mid-flight
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// `max(0, latest + interval - now)`; zero when nothing was ever synced
fn time_until_due(
    latest: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> Duration {
    latest
        .zip(chrono::Duration::from_std(interval).ok())
        .and_then(|(latest, interval)| latest.checked_add_signed(interval))
        .and_then(|due| (due - now).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop. A run already in progress completes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("[Scheduler] Background task ended abnormally: {}", e);
        }
    }
}
