//! File-based metrics exporter.
//!
//! Writes JSON snapshots atomically using `tempfile` + rename to prevent
//! partial reads by monitoring tools.

use super::{FileMetricsConfig, MetricsError, MetricsExporter, MetricsSnapshot};
use async_trait::async_trait;
use std::path::PathBuf;

/// Exports metrics snapshots as JSON files using atomic writes.
pub struct FileExporter {
    path: PathBuf,
    pretty_print: bool,
}

impl FileExporter {
    /// Create a new file exporter, ensuring the parent directory exists.
    pub fn new(config: FileMetricsConfig) -> Result<Self, MetricsError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MetricsError::ConfigError(format!(
                    "Failed to create metrics directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(Self {
            path: config.path,
            pretty_print: config.pretty_print,
        })
    }
}

#[async_trait]
impl MetricsExporter for FileExporter {
    async fn export(&self, snapshot: &MetricsSnapshot) -> Result<(), MetricsError> {
        let json = if self.pretty_print {
            serde_json::to_string_pretty(snapshot)?
        } else {
            serde_json::to_string(snapshot)?
        };

        let path = self.path.clone();

        // Perform the atomic write on a blocking thread to avoid blocking the runtime.
        tokio::task::spawn_blocking(move || -> Result<(), MetricsError> {
            use std::io::Write;

            let parent = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
            tmp.write_all(json.as_bytes())?;
            tmp.flush()?;
            tmp.persist(&path).map_err(|e| {
                MetricsError::ExportFailed(format!(
                    "Failed to persist metrics file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Ok(())
        })
        .await
        .map_err(|e| MetricsError::ExportFailed(format!("Blocking task panicked: {}", e)))??;

        tracing::debug!("Metrics snapshot written to {}", self.path.display());
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), MetricsError> {
        Ok(())
    }
}
