pub mod config;
pub mod core;
pub mod sink;
pub mod storage;
pub mod sync;
pub mod testing;

pub use config::TidemarkConfig;
pub use sync::{EntityRegistry, Scheduler, SchedulerHandle, SyncCoordinator, SyncExecutor};

// Re-export the shared data model so callers need a single dependency
pub use tidemark_api::{
    BlobMetadata, EntityDescriptor, EntityWatermark, Record, RunSummary, SchedulerState,
    SchedulerStatus, SyncError, SyncResult,
};
