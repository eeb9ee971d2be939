use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A single row mirrored from the relational source, keyed by column name
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Describes one synchronizable table
///
/// `cursor_field` is the time column used to decide which records are new
/// or changed since the last successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub cursor_field: String,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>, cursor_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cursor_field: cursor_field.into(),
        }
    }
}

/// Metadata attached to every snapshot blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub last_sync_timestamp: DateTime<Utc>,
    pub record_count: usize,
    pub new_record_count: usize,
}

impl BlobMetadata {
    pub fn new(last_sync_timestamp: DateTime<Utc>, record_count: usize, new_record_count: usize) -> Self {
        Self {
            last_sync_timestamp,
            record_count,
            new_record_count,
        }
    }

    /// Flatten into string pairs, the shape object stores accept as custom metadata
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "lastSyncTimestamp",
                self.last_sync_timestamp
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("recordCount", self.record_count.to_string()),
            ("newRecordCount", self.new_record_count.to_string()),
        ]
    }
}
