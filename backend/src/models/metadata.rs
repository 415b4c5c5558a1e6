//! `maven-metadata.xml` model.
//!
//! The same type serves the three metadata levels: project level
//! (`g/a/maven-metadata.xml`, carries the version list), version level
//! (`g/a/v-SNAPSHOT/maven-metadata.xml`, carries the snapshot pointer) and
//! proxied copies (`maven-metadata-<remoteId>.xml`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::formats::version::{self, compare_versions};

/// Format of `<lastUpdated>`.
pub const LAST_UPDATED_FORMAT: &str = "%Y%m%d%H%M%S";

/// Newest deployed build of a snapshot version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotVersion {
    /// `yyyyMMdd.HHmmss`; absent for locally installed snapshots.
    pub timestamp: Option<String>,
    pub build_number: u32,
}

impl SnapshotVersion {
    /// Derive the pointer from a unique build version such as
    /// `1.0-20070504.153317-1`.
    pub fn from_build_version(build: &str) -> Option<Self> {
        version::parse_unique_snapshot(build).map(|s| Self {
            timestamp: Some(s.timestamp.to_string()),
            build_number: s.build_number,
        })
    }

    fn is_newer_than(&self, other: &SnapshotVersion) -> bool {
        (self.timestamp.as_deref().unwrap_or(""), self.build_number)
            > (other.timestamp.as_deref().unwrap_or(""), other.build_number)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub latest_version: Option<String>,
    pub released_version: Option<String>,
    /// Sorted with the version comparator, no duplicates.
    pub available_versions: Vec<String>,
    pub snapshot_version: Option<SnapshotVersion>,
    pub last_updated: Option<String>,
}

impl RepositoryMetadata {
    pub fn for_project(group_id: &str, artifact_id: &str) -> Self {
        Self {
            group_id: Some(group_id.to_string()),
            artifact_id: Some(artifact_id.to_string()),
            ..Default::default()
        }
    }

    pub fn for_version(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            version: Some(version.to_string()),
            ..Self::for_project(group_id, artifact_id)
        }
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.available_versions.iter().any(|v| v == version)
    }

    /// Add a version to the list. Returns whether anything changed.
    pub fn add_version(&mut self, version: &str) -> bool {
        if self.has_version(version) {
            return false;
        }
        self.available_versions.push(version.to_string());
        version::sort_versions(&mut self.available_versions);
        self.recompute_latest();
        if !version::is_snapshot(version) {
            self.recompute_release();
        }
        true
    }

    /// Remove a version from the list. Returns whether anything changed.
    pub fn remove_version(&mut self, version: &str) -> bool {
        let before = self.available_versions.len();
        self.available_versions.retain(|v| v != version);
        if self.available_versions.len() == before {
            return false;
        }
        self.recompute_latest();
        let release_gone = self
            .released_version
            .as_deref()
            .is_some_and(|r| !self.has_version(r));
        if !version::is_snapshot(version) || release_gone {
            self.recompute_release();
        }
        true
    }

    /// Fold another copy of the same metadata into this one. Returns whether
    /// anything changed.
    pub fn merge(&mut self, other: &RepositoryMetadata) -> bool {
        let mut changed = false;

        for (mine, theirs) in [
            (&mut self.group_id, &other.group_id),
            (&mut self.artifact_id, &other.artifact_id),
            (&mut self.version, &other.version),
        ] {
            if mine.is_none() && theirs.is_some() {
                *mine = theirs.clone();
                changed = true;
            }
        }

        let mut added_release = false;
        for v in &other.available_versions {
            if !self.has_version(v) {
                self.available_versions.push(v.clone());
                added_release |= !version::is_snapshot(v);
                changed = true;
            }
        }
        if changed {
            version::sort_versions(&mut self.available_versions);
        }
        if self.recompute_latest() {
            changed = true;
        }
        let release_gone = self
            .released_version
            .as_deref()
            .is_some_and(|r| !self.has_version(r));
        if (added_release || release_gone || self.released_version.is_none())
            && self.recompute_release()
        {
            changed = true;
        }

        if let Some(theirs) = &other.snapshot_version {
            let newer = match &self.snapshot_version {
                Some(mine) => theirs.is_newer_than(mine),
                None => true,
            };
            if newer {
                self.snapshot_version = Some(theirs.clone());
                changed = true;
            }
        }

        if other.last_updated > self.last_updated {
            self.last_updated = other.last_updated.clone();
            changed = true;
        }

        changed
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = Some(now.format(LAST_UPDATED_FORMAT).to_string());
    }

    fn recompute_latest(&mut self) -> bool {
        let latest = self
            .available_versions
            .iter()
            .max_by(|a, b| compare_versions(a, b))
            .cloned();
        if latest != self.latest_version {
            self.latest_version = latest;
            true
        } else {
            false
        }
    }

    fn recompute_release(&mut self) -> bool {
        let release = self
            .available_versions
            .iter()
            .filter(|v| !version::is_snapshot(v))
            .max_by(|a, b| compare_versions(a, b))
            .cloned();
        if release != self.released_version {
            self.released_version = release;
            true
        } else {
            false
        }
    }
}
