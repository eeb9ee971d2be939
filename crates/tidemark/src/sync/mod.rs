//! Sync orchestration
//!
//! - `registry`: the fixed, ordered set of entities and their fetchers
//! - `executor`: one incremental sync cycle for one entity
//! - `coordinator`: one run across every registered entity
//! - `scheduler`: recurring and manual runs, plus status

pub mod coordinator;
pub mod executor;
pub mod registry;
pub mod scheduler;

pub use coordinator::SyncCoordinator;
pub use executor::SyncExecutor;
pub use registry::{EntityRegistry, RegisteredEntity, RegistryBuilder, RegistryError};
pub use scheduler::{Scheduler, SchedulerHandle};
