pub mod clock;
pub mod datasource;

pub use clock::{Clock, SystemClock};
pub use datasource::{
    DeltaFetcher, RecordSource, Result, SnapshotSink, TableFetcher, WatermarkStore,
};
