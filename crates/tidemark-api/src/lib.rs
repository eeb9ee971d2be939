//! Shared data model for the tidemark synchronization pipeline
//!
//! - `entity`: entity descriptors, records and snapshot blob metadata
//! - `sync_result`: per-entity results and the run summary with its textual report
//! - `status`: scheduler state and watermark status snapshots
//!
//! The error taxonomy lives here as well so that boundary implementations
//! (relational sources, object-storage sinks) can report failures without
//! depending on the core crate.

pub mod entity;
pub mod status;
pub mod sync_result;

pub use entity::{BlobMetadata, EntityDescriptor, Record};
pub use status::{EntityWatermark, SchedulerState, SchedulerStatus};
pub use sync_result::{RunSummary, SyncResult};

use std::time::Duration;

/// Entity-local failure raised at one of the external boundaries
///
/// None of these escape the sync executor: they are captured into a failed
/// `SyncResult` so that the remaining entities of a run still execute.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Source unavailable: {message}")]
    SourceUnavailable { message: String },

    #[error("Query error: {message}")]
    QueryError { message: String },

    #[error("Sink unavailable: {message}")]
    SinkUnavailable { message: String },

    #[error("Write error: {message}")]
    WriteError { message: String },

    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    #[error("Timed out after {after:?} while trying to {operation}")]
    Timeout { operation: String, after: Duration },

    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },
}

impl SyncError {
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::QueryError {
            message: message.into(),
        }
    }

    pub fn sink_unavailable(message: impl Into<String>) -> Self {
        Self::SinkUnavailable {
            message: message.into(),
        }
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteError {
            message: message.into(),
        }
    }

    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Short machine-friendly name of the failure class, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::SourceUnavailable { .. } => "source_unavailable",
            SyncError::QueryError { .. } => "query_error",
            SyncError::SinkUnavailable { .. } => "sink_unavailable",
            SyncError::WriteError { .. } => "write_error",
            SyncError::SerializationError { .. } => "serialization_error",
            SyncError::Timeout { .. } => "timeout",
            SyncError::Checkpoint { .. } => "checkpoint",
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = SyncError::sink_unavailable("bucket offline");
        assert_eq!(err.to_string(), "Sink unavailable: bucket offline");
        assert_eq!(err.kind(), "sink_unavailable");

        let err = SyncError::Timeout {
            operation: "fetch delta".to_string(),
            after: Duration::from_secs(5),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 5s while trying to fetch delta"
        );
    }

    #[test]
    fn test_serde_json_error_is_serialization_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SyncError = json_err.into();
        assert_eq!(err.kind(), "serialization_error");
    }
}
