pub mod backend;
pub mod record_source;
pub mod watermark_store;

pub use backend::LibsqlBackend;
pub use record_source::LibsqlRecordSource;
pub use watermark_store::{InMemoryWatermarkStore, LibsqlWatermarkStore};
