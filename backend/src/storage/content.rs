//! Layout-aware view of a managed repository on disk.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::formats::version::{self, compare_versions};
use crate::formats::{get_layout, is_checksum_path, is_metadata_path, LayoutError, RepositoryLayout};
use crate::models::artifact::{ArtifactReference, ProjectReference, VersionedReference};
use crate::models::repository::{LayoutKind, ManagedRepository};
use crate::storage::checksum::side_file;
use crate::storage::filesystem::is_staging_name;

/// Side-files that travel with an artifact file.
pub const SIDE_FILE_EXTENSIONS: &[&str] = &["sha1", "md5", "sha256", "asc"];

/// An artifact file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub reference: ArtifactReference,
}

pub struct ManagedRepositoryContent {
    repository: Arc<ManagedRepository>,
    layout: &'static dyn RepositoryLayout,
}

impl ManagedRepositoryContent {
    pub fn new(repository: Arc<ManagedRepository>) -> Self {
        let layout = get_layout(repository.layout);
        Self { repository, layout }
    }

    pub fn id(&self) -> &str {
        &self.repository.id
    }

    pub fn repository(&self) -> &ManagedRepository {
        &self.repository
    }

    pub fn root(&self) -> &Path {
        &self.repository.location
    }

    pub fn layout(&self) -> &'static dyn RepositoryLayout {
        self.layout
    }

    pub fn to_path(&self, reference: &ArtifactReference) -> String {
        self.layout.to_path(reference)
    }

    pub fn to_file(&self, reference: &ArtifactReference) -> PathBuf {
        self.resolve(&self.layout.to_path(reference))
    }

    pub fn to_artifact_reference(&self, path: &str) -> Result<ArtifactReference, LayoutError> {
        self.layout.to_artifact_reference(path)
    }

    /// Absolute location of a repository-relative path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let mut path = self.repository.location.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty() && *s != "." && *s != "..") {
            path.push(segment);
        }
        path
    }

    /// Repository-relative form of an absolute path under the root.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.repository.location).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }

    pub fn version_dir(&self, reference: &VersionedReference) -> Result<PathBuf, LayoutError> {
        Ok(self.resolve(&self.layout.to_versioned_path(reference)?))
    }

    pub fn project_dir(&self, reference: &ProjectReference) -> Result<PathBuf, LayoutError> {
        Ok(self.resolve(&self.layout.to_project_path(reference)?))
    }

    /// Parse every artifact file in `dir` (not recursive), skipping side-files,
    /// metadata and staging entries.
    fn artifacts_in(&self, dir: &Path) -> io::Result<Vec<ArtifactFile>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || is_staging_name(&name) || is_side_file(&name) || is_metadata_path(&name) {
                continue;
            }
            let path = entry.path();
            let Some(relative) = self.relative(&path) else {
                continue;
            };
            if let Ok(reference) = self.layout.to_artifact_reference(&relative) {
                found.push(ArtifactFile { path, reference });
            }
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    /// Directories that may hold files of the given project.
    fn project_file_dirs(&self, project: &ProjectReference) -> io::Result<Vec<PathBuf>> {
        match self.repository.layout {
            LayoutKind::Default => {
                let dir = self
                    .project_dir(project)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                subdirectories(&dir)
            }
            // groupId/<type>s/
            LayoutKind::Legacy => subdirectories(&self.root().join(&project.group_id)),
        }
    }

    /// Artifact files (every build, classifier and type) of one version.
    pub fn artifacts_of_version(&self, reference: &VersionedReference) -> io::Result<Vec<ArtifactFile>> {
        let base = version::base_version(&reference.version);
        let dirs = match self.repository.layout {
            LayoutKind::Default => vec![self
                .version_dir(reference)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?],
            LayoutKind::Legacy => self.project_file_dirs(&reference.project())?,
        };

        let mut artifacts = Vec::new();
        for dir in dirs {
            artifacts.extend(self.artifacts_in(&dir)?.into_iter().filter(|a| {
                a.reference.group_id == reference.group_id
                    && a.reference.artifact_id == reference.artifact_id
                    && a.reference.base_version() == base
            }));
        }
        Ok(artifacts)
    }

    /// Distinct build versions of a version, oldest first.
    pub fn get_builds(&self, reference: &VersionedReference) -> io::Result<Vec<String>> {
        let builds: BTreeSet<String> = self
            .artifacts_of_version(reference)?
            .into_iter()
            .map(|a| a.reference.version)
            .collect();
        let mut builds: Vec<String> = builds.into_iter().collect();
        builds.sort_by(|a, b| compare_versions(a, b));
        Ok(builds)
    }

    /// Base versions present for a project, oldest first.
    pub fn get_versions(&self, project: &ProjectReference) -> io::Result<Vec<String>> {
        let mut versions = BTreeSet::new();
        for dir in self.project_file_dirs(project)? {
            for artifact in self.artifacts_in(&dir)? {
                if artifact.reference.group_id == project.group_id
                    && artifact.reference.artifact_id == project.artifact_id
                {
                    versions.insert(artifact.reference.base_version());
                }
            }
        }
        let mut versions: Vec<String> = versions.into_iter().collect();
        versions.sort_by(|a, b| compare_versions(a, b));
        Ok(versions)
    }

    /// Every file belonging to one build: all classifiers and types of
    /// `reference.version`, plus the side-files next to them.
    pub fn related_files(&self, reference: &ArtifactReference) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for artifact in self.artifacts_of_version(&reference.versioned())? {
            if artifact.reference.version != reference.version {
                continue;
            }
            for ext in SIDE_FILE_EXTENSIONS {
                let side = side_file(&artifact.path, ext);
                if side.exists() {
                    files.push(side);
                }
            }
            files.push(artifact.path);
        }
        Ok(files)
    }

    /// Whether any artifact file exists for the given version.
    pub fn has_version(&self, reference: &VersionedReference) -> io::Result<bool> {
        Ok(!self.artifacts_of_version(reference)?.is_empty())
    }
}

fn subdirectories(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() && !name.starts_with('.') {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn is_side_file(name: &str) -> bool {
    is_checksum_path(name) || name.ends_with(".asc")
}
