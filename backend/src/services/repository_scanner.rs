//! Managed repository traversal.
//!
//! Walks a repository root and hands every artifact path to the registered
//! content consumers. Hidden entries, staging directories, checksum and
//! signature side-files and metadata are never handed out.

use std::path::Path;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use walkdir::{DirEntry, WalkDir};

use crate::formats::{is_checksum_path, is_metadata_path};
use crate::models::repository::ManagedRepository;
use crate::services::purge_service::ContentConsumer;
use crate::storage::filesystem::is_staging_name;

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStatistics {
    pub repository_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Artifact files seen, whether or not they were new.
    pub total_files: u64,
    /// Artifact files handed to consumers.
    pub processed_files: u64,
    pub errors: u64,
    pub cancelled: bool,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.') || is_staging_name(name))
}

/// Whether a repository-relative path is something consumers care about.
pub fn is_artifact_path(relative: &str) -> bool {
    !(is_checksum_path(relative) || relative.ends_with(".asc") || is_metadata_path(relative))
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(segments.join("/"))
}

/// Scans one managed repository for its consumers.
pub struct RepositoryScanner {
    repository: Arc<ManagedRepository>,
    consumers: Vec<Arc<dyn ContentConsumer>>,
}

impl RepositoryScanner {
    pub fn new(repository: Arc<ManagedRepository>, consumers: Vec<Arc<dyn ContentConsumer>>) -> Self {
        Self {
            repository,
            consumers,
        }
    }

    /// Walk the repository. With `since`, files modified before that instant
    /// only go to consumers that ask for unmodified files. Blocking; run it
    /// off the async runtime.
    pub fn scan(&self, since: Option<SystemTime>, cancel: &CancellationToken) -> ScanStatistics {
        let started = Instant::now();
        let mut stats = ScanStatistics {
            repository_id: self.repository.id.clone(),
            started_at: Utc::now(),
            duration_ms: 0,
            total_files: 0,
            processed_files: 0,
            errors: 0,
            cancelled: false,
        };

        let root = &self.repository.location;
        if !root.is_dir() {
            tracing::warn!(repository = %self.repository.id, path = %root.display(), "Repository location missing, nothing to scan");
            return stats;
        }

        tracing::info!(
            repository = %self.repository.id,
            incremental = since.is_some(),
            "Starting repository scan"
        );

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in walker {
            if cancel.is_cancelled() {
                tracing::info!(repository = %self.repository.id, "Repository scan cancelled");
                stats.cancelled = true;
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(repository = %self.repository.id, error = %e, "Unable to read entry");
                    stats.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = relative_path(root, entry.path()) else {
                continue;
            };
            if !is_artifact_path(&relative) {
                continue;
            }
            stats.total_files += 1;

            let unmodified = since.is_some_and(|since| {
                entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .is_some_and(|m| m < since)
            });
            let consumers: Vec<&Arc<dyn ContentConsumer>> = self
                .consumers
                .iter()
                .filter(|c| !unmodified || c.process_unmodified())
                .collect();
            if consumers.is_empty() {
                continue;
            }

            stats.processed_files += 1;
            for consumer in consumers {
                if let Err(e) = consumer.process(&relative) {
                    tracing::warn!(
                        repository = %self.repository.id,
                        consumer = consumer.id(),
                        path = %relative,
                        error = %e,
                        "Consumer failed"
                    );
                    stats.errors += 1;
                }
            }
        }

        for consumer in &self.consumers {
            consumer.complete_scan();
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            repository = %stats.repository_id,
            total = stats.total_files,
            processed = stats.processed_files,
            errors = stats.errors,
            duration_ms = stats.duration_ms,
            "Repository scan finished"
        );
        stats
    }
}
