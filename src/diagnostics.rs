//! Failure artifacts: a screenshot and a JSON record per permanently failed target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::browser::Page;
use crate::config::DiagnosticsConfig;
use crate::models::CheckTarget;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub target: String,
    pub error: String,
    pub error_class: String,
    pub url: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub screenshot: Option<String>,
    pub dom_excerpt: Option<String>,
}

pub struct DiagnosticsRecorder {
    directory: PathBuf,
    dom_excerpt_bytes: usize,
    retention: Duration,
}

/// Truncates on a char boundary at or below `max_bytes`.
fn excerpt(html: &str, max_bytes: usize) -> &str {
    if html.len() <= max_bytes {
        return html;
    }
    let mut end = max_bytes;
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    &html[..end]
}

fn file_stem(target: &CheckTarget, at: DateTime<Utc>) -> String {
    let slug: String = format!("{}_{}", target.category.key, target.location.name)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{}_{}_{}", at.format("%Y%m%d_%H%M%S"), slug, uuid::Uuid::new_v4().simple())
}

impl DiagnosticsRecorder {
    pub fn new(directory: impl Into<PathBuf>, dom_excerpt_bytes: usize, retention_days: u32) -> Self {
        Self {
            directory: directory.into(),
            dom_excerpt_bytes,
            retention: Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60),
        }
    }

    /// `None` when capture is disabled.
    pub fn from_config(config: &DiagnosticsConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(&config.directory, config.dom_excerpt_bytes, config.retention_days))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes whatever can still be read from `page`; returns the record path.
    pub async fn capture(&self, target: &CheckTarget, error: &AppError, page: Option<&dyn Page>) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let captured_at = Utc::now();
        let stem = file_stem(target, captured_at);

        let mut record = DiagnosticRecord {
            target: target.to_string(),
            error: error.to_string(),
            error_class: error.class().to_string(),
            url: None,
            captured_at,
            screenshot: None,
            dom_excerpt: None,
        };

        if let Some(page) = page {
            record.url = page.url().await.ok();

            match page.content().await {
                Ok(html) => record.dom_excerpt = Some(excerpt(&html, self.dom_excerpt_bytes).to_string()),
                Err(e) => tracing::debug!(error = %e, "DOM unavailable for diagnostics"),
            }

            match page.screenshot().await {
                Ok(png) => {
                    let path = self.directory.join(format!("{}.png", stem));
                    tokio::fs::write(&path, png).await?;
                    record.screenshot = Some(path.to_string_lossy().to_string());
                }
                Err(e) => tracing::debug!(error = %e, "Screenshot unavailable for diagnostics"),
            }
        }

        let path = self.directory.join(format!("{}.json", stem));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&record)?).await?;

        tracing::info!(key = %target, path = %path.display(), "Captured failure diagnostics");
        Ok(path)
    }

    /// Deletes artifacts older than the retention window; returns how many went.
    pub async fn prune_expired(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age > self.retention {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, "Pruned expired diagnostics");
        }
        Ok(removed)
    }
}
