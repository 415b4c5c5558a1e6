//! Snapshot retention purge.
//!
//! Applied per artifact path found by the repository scanner:
//! - released snapshots: `X-SNAPSHOT` goes once `X` is in the repository
//!   (only with `delete_released_snapshots`)
//! - retention count (`days_older == 0`): keep the newest N builds
//! - days older: drop builds older than the cutoff
//!
//! Deleting builds keeps `maven-metadata.xml` at project and version level in
//! step with what is left on disk.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::formats::version::{self, parse_unique_snapshot};
use crate::formats::LayoutError;
use crate::models::artifact::{ArtifactReference, VersionedReference};
use crate::models::metadata::{RepositoryMetadata, SnapshotVersion};
use crate::models::repository::ManagedRepository;
use crate::services::metadata_service::{metadata_path, MetadataError, MetadataStore};
use crate::storage::content::ManagedRepositoryContent;
use crate::storage::filesystem::{modified_time, remove_file_if_exists};

#[derive(Error, Debug)]
pub enum PurgeError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Something that looks at each artifact path of a repository scan.
pub trait ContentConsumer: Send + Sync {
    fn id(&self) -> &str;

    /// Handle one repository-relative artifact path.
    fn process(&self, path: &str) -> Result<(), PurgeError>;

    /// Whether incremental scans must still hand over files that did not
    /// change since the last scan. Purges age out untouched builds, so they
    /// need every path.
    fn process_unmodified(&self) -> bool {
        false
    }

    /// Called once after the last path of a scan.
    fn complete_scan(&self) {}
}

/// What a purge did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted_files: Vec<PathBuf>,
    pub failed_files: Vec<PathBuf>,
    /// `groupId:artifactId:version` of versions that were removed entirely.
    pub removed_versions: Vec<String>,
}

impl PurgeReport {
    pub fn is_empty(&self) -> bool {
        self.deleted_files.is_empty() && self.failed_files.is_empty() && self.removed_versions.is_empty()
    }

    pub fn absorb(&mut self, other: PurgeReport) {
        self.deleted_files.extend(other.deleted_files);
        self.failed_files.extend(other.failed_files);
        self.removed_versions.extend(other.removed_versions);
    }

    fn delete(&mut self, path: PathBuf) {
        match remove_file_if_exists(&path) {
            Ok(true) => self.deleted_files.push(path),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete file");
                self.failed_files.push(path);
            }
        }
    }
}

/// Retention purge of one managed repository.
pub struct RepositoryPurge {
    content: ManagedRepositoryContent,
    metadata: Arc<MetadataStore>,
    cutoff: DateTime<Utc>,
    totals: Mutex<PurgeReport>,
}

impl RepositoryPurge {
    pub fn new(repository: Arc<ManagedRepository>, metadata: Arc<MetadataStore>) -> Self {
        Self::with_now(repository, metadata, Utc::now())
    }

    /// Purge with the days-older cutoff measured from `now`.
    pub fn with_now(repository: Arc<ManagedRepository>, metadata: Arc<MetadataStore>, now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::days(i64::from(repository.days_older));
        Self {
            content: ManagedRepositoryContent::new(repository),
            metadata,
            cutoff,
            totals: Mutex::new(PurgeReport::default()),
        }
    }

    pub fn repository(&self) -> &ManagedRepository {
        self.content.repository()
    }

    /// Everything purged by [`ContentConsumer::process`] calls so far.
    pub fn report(&self) -> PurgeReport {
        self.totals.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Apply the repository's retention rules to the version `path` belongs to.
    pub fn purge(&self, path: &str) -> Result<PurgeReport, PurgeError> {
        let mut report = PurgeReport::default();

        let reference = match self.content.to_artifact_reference(path) {
            Ok(reference) => reference,
            Err(e) => {
                tracing::debug!(path, error = %e, "Not an artifact, skipping");
                return Ok(report);
            }
        };
        if !reference.is_snapshot() || !self.content.resolve(path).exists() {
            return Ok(report);
        }

        let versioned = reference.versioned();
        let repository = self.content.repository();

        if repository.delete_released_snapshots && self.is_released(&versioned)? {
            tracing::info!(
                repository = %repository.id,
                version = %versioned,
                "Removing released snapshot"
            );
            self.remove_version(&versioned, &mut report)?;
            return Ok(report);
        }

        let builds = self.content.get_builds(&versioned)?;
        let doomed: Vec<&String> = if repository.days_older == 0 {
            let keep = repository.retention_count.max(1) as usize;
            builds.iter().take(builds.len().saturating_sub(keep)).collect()
        } else {
            let mut doomed = Vec::new();
            for build in &builds {
                if self.build_time(&reference, build)?.is_some_and(|t| t < self.cutoff) {
                    doomed.push(build);
                }
            }
            doomed
        };
        if doomed.is_empty() {
            return Ok(report);
        }

        for build in doomed {
            tracing::debug!(repository = %repository.id, build = %build, "Purging snapshot build");
            let target = ArtifactReference {
                version: build.clone(),
                ..reference.clone()
            };
            for file in self.content.related_files(&target)? {
                report.delete(file);
            }
        }

        let remaining = self.content.get_builds(&versioned)?;
        if remaining.is_empty() {
            self.remove_version(&versioned, &mut report)?;
        } else {
            self.update_snapshot_pointer(&versioned, &remaining)?;
        }

        if !report.deleted_files.is_empty() {
            tracing::info!(
                repository = %repository.id,
                version = %versioned,
                deleted = report.deleted_files.len(),
                "Purged snapshot builds"
            );
        }
        Ok(report)
    }

    /// Whether the release of a snapshot version is in the repository.
    fn is_released(&self, versioned: &VersionedReference) -> Result<bool, PurgeError> {
        let Some(release) = version::release_version(&versioned.version) else {
            return Ok(false);
        };
        let versions = self.content.get_versions(&versioned.project())?;
        Ok(versions.iter().any(|v| *v == release))
    }

    /// When a build was made: unique builds carry it in their version,
    /// generic ones use the newest modification time of their files.
    fn build_time(&self, reference: &ArtifactReference, build: &str) -> Result<Option<DateTime<Utc>>, PurgeError> {
        if let Some(time) = parse_unique_snapshot(build).and_then(|s| s.timestamp_utc()) {
            return Ok(Some(time));
        }
        let newest = self
            .content
            .artifacts_of_version(&reference.versioned())?
            .iter()
            .filter(|a| a.reference.version == build)
            .filter_map(|a| modified_time(&a.path))
            .max();
        Ok(newest.map(DateTime::<Utc>::from))
    }

    /// Delete every file of a version, its directory, and drop it from the
    /// project metadata.
    fn remove_version(&self, versioned: &VersionedReference, report: &mut PurgeReport) -> Result<(), PurgeError> {
        for artifact in self.content.artifacts_of_version(versioned)? {
            for file in self.content.related_files(&artifact.reference)? {
                report.delete(file);
            }
        }

        if self.content.layout().supports_metadata() {
            let dir = self.content.version_dir(versioned)?;
            if dir.exists() {
                if let Err(e) = fs::remove_dir_all(&dir) {
                    tracing::warn!(path = %dir.display(), error = %e, "Failed to remove version directory");
                    report.failed_files.push(dir);
                }
            }
            self.drop_from_project_metadata(versioned)?;
        }
        report.removed_versions.push(versioned.to_string());
        Ok(())
    }

    fn drop_from_project_metadata(&self, versioned: &VersionedReference) -> Result<(), PurgeError> {
        let path = metadata_path(&self.content.project_dir(&versioned.project())?);
        if !path.exists() {
            return Ok(());
        }
        let changed = self.metadata.update(
            &path,
            || RepositoryMetadata::for_project(&versioned.group_id, &versioned.artifact_id),
            |m| m.remove_version(&versioned.version),
        )?;
        if changed {
            tracing::debug!(path = %path.display(), version = %versioned.version, "Removed version from metadata");
        }
        Ok(())
    }

    /// Point the version metadata's `<snapshot>` at the newest remaining build.
    fn update_snapshot_pointer(&self, versioned: &VersionedReference, remaining: &[String]) -> Result<(), PurgeError> {
        if !self.content.layout().supports_metadata() {
            return Ok(());
        }
        let path = metadata_path(&self.content.version_dir(versioned)?);
        if !path.exists() {
            return Ok(());
        }
        let Some(newest) = remaining.iter().rev().find_map(|b| SnapshotVersion::from_build_version(b)) else {
            return Ok(());
        };
        self.metadata.update(
            &path,
            || RepositoryMetadata::for_version(&versioned.group_id, &versioned.artifact_id, &versioned.version),
            |m| {
                if m.snapshot_version.as_ref() == Some(&newest) {
                    return false;
                }
                m.snapshot_version = Some(newest);
                true
            },
        )?;
        Ok(())
    }
}

impl ContentConsumer for RepositoryPurge {
    fn id(&self) -> &str {
        "repository-purge"
    }

    fn process_unmodified(&self) -> bool {
        true
    }

    fn process(&self, path: &str) -> Result<(), PurgeError> {
        let report = self.purge(path)?;
        if !report.is_empty() {
            self.totals.lock().unwrap_or_else(|e| e.into_inner()).absorb(report);
        }
        Ok(())
    }

    fn complete_scan(&self) {
        let totals = self.report();
        tracing::info!(
            repository = %self.content.id(),
            deleted = totals.deleted_files.len(),
            failed = totals.failed_files.len(),
            versions = totals.removed_versions.len(),
            "Repository purge complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, relative.as_bytes()).unwrap();
    }

    const VERSION_DIR: &str = "org/example/lib/1.0-SNAPSHOT";

    fn repository(root: &Path, days_older: u32, retention_count: u32) -> Arc<ManagedRepository> {
        let mut repo = ManagedRepository::new("snapshots", root);
        repo.snapshots = true;
        repo.days_older = days_older;
        repo.retention_count = retention_count;
        Arc::new(repo)
    }

    fn builds(root: &Path, builds: &[&str]) {
        for build in builds {
            touch(root, &format!("{}/lib-1.0-{}.jar", VERSION_DIR, build));
            touch(root, &format!("{}/lib-1.0-{}.jar.sha1", VERSION_DIR, build));
        }
    }

    #[test]
    fn test_releases_and_non_artifacts_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "org/example/lib/1.0/lib-1.0.jar");
        let purge = RepositoryPurge::new(repository(dir.path(), 0, 1), Arc::new(MetadataStore::new()));

        assert!(purge.purge("org/example/lib/1.0/lib-1.0.jar").unwrap().is_empty());
        assert!(purge.purge("not/an/artifact").unwrap().is_empty());
        assert!(purge
            .purge("org/example/lib/1.0-SNAPSHOT/lib-1.0-20070504.153317-1.jar")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_retention_count_zero_keeps_one_build() {
        let dir = tempfile::tempdir().unwrap();
        builds(dir.path(), &["20070504.153317-1", "20070505.090015-2"]);
        let purge = RepositoryPurge::new(repository(dir.path(), 0, 0), Arc::new(MetadataStore::new()));

        let report = purge
            .purge(&format!("{}/lib-1.0-20070505.090015-2.jar", VERSION_DIR))
            .unwrap();
        assert_eq!(report.deleted_files.len(), 2);
        assert!(report.removed_versions.is_empty());
        assert!(dir.path().join(VERSION_DIR).join("lib-1.0-20070505.090015-2.jar").exists());
        assert!(!dir.path().join(VERSION_DIR).join("lib-1.0-20070504.153317-1.jar").exists());
    }

    #[test]
    fn test_days_older_uses_build_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        builds(dir.path(), &["20070504.153317-1", "20070601.120000-2"]);
        let now = "2007-06-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let purge = RepositoryPurge::with_now(repository(dir.path(), 30, 2), Arc::new(MetadataStore::new()), now);

        let report = purge
            .purge(&format!("{}/lib-1.0-20070601.120000-2.jar", VERSION_DIR))
            .unwrap();
        assert_eq!(report.deleted_files.len(), 2);
        assert!(dir.path().join(VERSION_DIR).join("lib-1.0-20070601.120000-2.jar").exists());
    }

    #[test]
    fn test_snapshot_pointer_follows_remaining_builds() {
        let dir = tempfile::tempdir().unwrap();
        builds(dir.path(), &["20070504.153317-1", "20070505.090015-2", "20070506.090132-3"]);
        let version_metadata = metadata_path(&dir.path().join(VERSION_DIR));
        let mut metadata = RepositoryMetadata::for_version("org.example", "lib", "1.0-SNAPSHOT");
        metadata.snapshot_version = SnapshotVersion::from_build_version("1.0-20070507.000000-4");
        MetadataStore::write(&version_metadata, &metadata).unwrap();

        let store = Arc::new(MetadataStore::new());
        let purge = RepositoryPurge::new(repository(dir.path(), 0, 2), store);
        purge
            .process(&format!("{}/lib-1.0-20070504.153317-1.jar", VERSION_DIR))
            .unwrap();

        let metadata = MetadataStore::read(&version_metadata).unwrap().unwrap();
        let snapshot = metadata.snapshot_version.unwrap();
        assert_eq!(snapshot.timestamp.as_deref(), Some("20070506.090132"));
        assert_eq!(snapshot.build_number, 3);
        assert_eq!(purge.report().deleted_files.len(), 2);
    }

    #[test]
    fn test_all_builds_gone_removes_version() {
        let dir = tempfile::tempdir().unwrap();
        builds(dir.path(), &["20070504.153317-1"]);
        let project_metadata = metadata_path(&dir.path().join("org/example/lib"));
        let mut metadata = RepositoryMetadata::for_project("org.example", "lib");
        metadata.add_version("0.9");
        metadata.add_version("1.0-SNAPSHOT");
        MetadataStore::write(&project_metadata, &metadata).unwrap();

        let now = "2008-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let purge = RepositoryPurge::with_now(repository(dir.path(), 30, 2), Arc::new(MetadataStore::new()), now);
        let report = purge
            .purge(&format!("{}/lib-1.0-20070504.153317-1.jar", VERSION_DIR))
            .unwrap();

        assert_eq!(report.removed_versions, vec!["org.example:lib:1.0-SNAPSHOT"]);
        assert!(!dir.path().join(VERSION_DIR).exists());
        let metadata = MetadataStore::read(&project_metadata).unwrap().unwrap();
        assert_eq!(metadata.available_versions, vec!["0.9"]);
        assert_eq!(metadata.latest_version.as_deref(), Some("0.9"));
    }
}
