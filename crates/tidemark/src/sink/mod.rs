//! Snapshot sinks
//!
//! - `filesystem`: local directory tree, one file per blob plus a metadata sidecar
//! - `memory`: in-process store with write tracing and failure injection
//!
//! The Cloud Storage sink lives in the `tidemark-gcs` crate.

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemSink;
pub use memory::{MemorySink, StoredSnapshot};
