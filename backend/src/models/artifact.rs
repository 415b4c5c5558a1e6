//! Artifact coordinate models.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::formats::version;

/// A single file in a repository, identified by its Maven coordinate.
///
/// For timestamped snapshots `version` holds the build version
/// (`1.0-20070504.153317-1`); [`ArtifactReference::base_version`] gives the
/// directory version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub classifier: Option<String>,
    #[serde(rename = "type")]
    pub artifact_type: String,
}

impl ArtifactReference {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        classifier: Option<&str>,
        artifact_type: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: classifier.filter(|c| !c.is_empty()).map(str::to_string),
            artifact_type: artifact_type.into(),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        version::is_snapshot(&self.version)
    }

    pub fn base_version(&self) -> String {
        version::base_version(&self.version)
    }

    pub fn project(&self) -> ProjectReference {
        ProjectReference {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
        }
    }

    /// The version directory holding this artifact.
    pub fn versioned(&self) -> VersionedReference {
        VersionedReference {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.base_version(),
        }
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        write!(f, ":{}", self.artifact_type)
    }
}

/// groupId + artifactId.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectReference {
    pub group_id: String,
    pub artifact_id: String,
}

impl fmt::Display for ProjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)
    }
}

/// groupId + artifactId + (base) version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedReference {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl VersionedReference {
    pub fn project(&self) -> ProjectReference {
        ProjectReference {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
        }
    }
}

impl fmt::Display for VersionedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}
