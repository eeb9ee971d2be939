//! Configuration for the sync pipeline
//!
//! Loaded from YAML, then overridden from the environment:
//!
//! ```yaml
//! schedule:
//!   interval_secs: 86400
//! source:
//!   url: file:risk.db
//! sink:
//!   kind: gcs
//!   bucket: risk-mirror
//! watermarks:
//!   kind: libsql
//!   url: file:tidemark-state.db
//! entities:
//!   - name: violations
//!     cursor_field: updated_at
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::sync::registry::is_valid_identifier;

pub const DEFAULT_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_BLOB_PREFIX: &str = "sync";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TidemarkConfig {
    pub schedule: ScheduleConfig,
    pub sync: SyncSettings,
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub watermarks: WatermarkConfig,
    pub entities: Vec<EntityConfig>,
}

impl Default for TidemarkConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            sync: SyncSettings::default(),
            source: SourceConfig::default(),
            sink: SinkConfig::default(),
            watermarks: WatermarkConfig::default(),
            entities: default_entities(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    /// Run once immediately when the scheduler starts
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            run_on_start: true,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Blobs are named `<blob_prefix>/<entity>.json`
    pub blob_prefix: String,
    /// Deadline for each individual fetch, write or checkpoint call
    pub call_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            blob_prefix: DEFAULT_BLOB_PREFIX.to_string(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

impl SyncSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    pub auth_token: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "file:risk.db".to_string(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Filesystem {
        root: PathBuf,
    },
    Gcs {
        bucket: String,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        access_token: Option<String>,
    },
    Memory,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Filesystem {
            root: PathBuf::from("snapshots"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatermarkConfig {
    /// Lost on restart; the next run re-transfers every entity
    Memory,
    Libsql {
        url: String,
    },
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        WatermarkConfig::Libsql {
            url: "file:tidemark-state.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub cursor_field: String,
    /// Source table, defaults to `name`
    #[serde(default)]
    pub table: Option<String>,
}

impl EntityConfig {
    pub fn new(name: &str, cursor_field: &str) -> Self {
        Self {
            name: name.to_string(),
            cursor_field: cursor_field.to_string(),
            table: None,
        }
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

/// The tables mirrored by the risk-assessment backend
pub fn default_entities() -> Vec<EntityConfig> {
    vec![
        EntityConfig::new("violations", "updated_at"),
        EntityConfig::new("incidents", "created_at"),
        EntityConfig::new("vulnerabilities", "created_at"),
        EntityConfig::new("breach_notifications", "created_at"),
        EntityConfig::new("regulatory_actions", "created_at"),
        EntityConfig::new("compliance_findings", "created_at"),
        EntityConfig::new("research_papers", "created_at"),
    ]
}

impl TidemarkConfig {
    /// Load from a YAML file, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    ///
    /// - `TIDEMARK_SOURCE_URL`, `TIDEMARK_SOURCE_TOKEN`
    /// - `TIDEMARK_INTERVAL_SECS`
    /// - `TIDEMARK_GCS_TOKEN` (only for the gcs sink)
    ///
    /// An override that does not parse is rejected rather than ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TIDEMARK_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(token) = lookup("TIDEMARK_SOURCE_TOKEN") {
            self.source.auth_token = Some(token);
        }
        if let Some(secs) = lookup("TIDEMARK_INTERVAL_SECS") {
            self.schedule.interval_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "TIDEMARK_INTERVAL_SECS '{}' is not a whole number of seconds",
                    secs
                ))
            })?;
        }
        if let SinkConfig::Gcs { access_token, .. } = &mut self.sink {
            if let Some(token) = lookup("TIDEMARK_GCS_TOKEN") {
                *access_token = Some(token);
            }
        }
        Ok(())
    }

    /// Reject configurations that could only fail at run time
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "schedule.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.sync.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "sync.call_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !is_valid_blob_prefix(&self.sync.blob_prefix) {
            return Err(ConfigError::Invalid(format!(
                "sync.blob_prefix '{}' must be non-empty and contain only letters, digits, '-', '_', '.' or '/'",
                self.sync.blob_prefix
            )));
        }
        if self.entities.is_empty() {
            return Err(ConfigError::Invalid("no entities configured".to_string()));
        }
        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !is_valid_identifier(&entity.name) || !is_valid_identifier(&entity.cursor_field) {
                return Err(ConfigError::Invalid(format!(
                    "entity '{}' with cursor field '{}' is not a valid identifier pair",
                    entity.name, entity.cursor_field
                )));
            }
            if !seen.insert(entity.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "entity '{}' is listed more than once",
                    entity.name
                )));
            }
            if !is_valid_identifier(entity.table_name()) {
                return Err(ConfigError::Invalid(format!(
                    "entity '{}' has invalid table name '{}'",
                    entity.name,
                    entity.table_name()
                )));
            }
        }
        if let SinkConfig::Gcs { bucket, .. } = &self.sink {
            if bucket.is_empty() {
                return Err(ConfigError::Invalid("sink.bucket is empty".to_string()));
            }
        }
        Ok(())
    }
}

fn is_valid_blob_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && !prefix.starts_with('/')
        && !prefix.ends_with('/')
        && !prefix.split('/').any(|part| part.is_empty() || part == "..")
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
}
