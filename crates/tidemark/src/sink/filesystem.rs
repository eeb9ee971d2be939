//! Local directory sink
//!
//! Each blob `a/b.json` lands at `<root>/a/b.json`, with its metadata in
//! `<root>/a/b.json.metadata.json`. Content is written to a temporary file
//! and renamed over the target so readers never see a half-written snapshot.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::core::datasource::{Result, SnapshotSink};
use tidemark_api::{BlobMetadata, SyncError};

#[derive(Debug, Clone)]
pub struct FilesystemSink {
    root: PathBuf,
}

impl FilesystemSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blob_path(&self, blob_name: &str) -> PathBuf {
        self.root.join(blob_name)
    }

    pub fn metadata_path(&self, blob_name: &str) -> PathBuf {
        with_suffix(&self.blob_path(blob_name), ".metadata.json")
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn replace_file(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let tmp = with_suffix(target, ".tmp");
    let replaced = match fs::write(&tmp, content).await {
        Ok(()) => fs::rename(&tmp, target).await,
        Err(e) => Err(e),
    };
    if replaced.is_err() {
        if let Err(e) = fs::remove_file(&tmp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "[FilesystemSink] Failed to remove temporary file {}: {}",
                    tmp.display(),
                    e
                );
            }
        }
    }
    replaced
}

#[async_trait]
impl SnapshotSink for FilesystemSink {
    async fn write_snapshot(
        &self,
        blob_name: &str,
        content: Vec<u8>,
        metadata: &BlobMetadata,
    ) -> Result<()> {
        let path = self.blob_path(blob_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::sink_unavailable(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        replace_file(&path, &content).await.map_err(|e| {
            SyncError::write(format!("Failed to write {}: {}", path.display(), e))
        })?;

        let metadata_path = self.metadata_path(blob_name);
        let metadata_json = serde_json::to_vec_pretty(metadata)?;
        replace_file(&metadata_path, &metadata_json)
            .await
            .map_err(|e| {
                SyncError::write(format!(
                    "Failed to write {}: {}",
                    metadata_path.display(),
                    e
                ))
            })?;

        debug!(
            "[FilesystemSink] Wrote {} ({} bytes)",
            path.display(),
            content.len()
        );
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "filesystem"
    }
}
