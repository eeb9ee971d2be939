//! Test doubles for the sync pipeline
//!
//! Key components:
//! - `ManualClock`: a clock that only moves when told to
//! - `TimestampedTable`: an in-memory table answering delta queries by cursor field
//! - `FailingFetcher` / `HangingFetcher`: fetchers that error or never complete

pub mod clock;
pub mod fetchers;

pub use clock::ManualClock;
pub use fetchers::{incident_records, FailingFetcher, HangingFetcher, TimestampedTable};
