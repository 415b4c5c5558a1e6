//! Repository path layouts.
//!
//! A layout maps artifact coordinates to repository-relative paths and back.
//! Two layouts exist: the Maven 2 `default` layout and the Maven 1 `legacy`
//! layout.

pub mod legacy;
pub mod maven;
pub mod version;

use thiserror::Error;

use crate::models::artifact::{ArtifactReference, ProjectReference, VersionedReference};
use crate::models::repository::LayoutKind;

pub const METADATA_FILENAME: &str = "maven-metadata.xml";

/// Checksum side-file extensions understood by the proxy.
pub const CHECKSUM_EXTENSIONS: &[&str] = &["sha1", "md5", "sha256"];

/// Extensions made of more than one dot-separated part.
const COMPOUND_EXTENSIONS: &[&str] = &["tar.gz", "tar.bz2"];

/// Path could not be mapped to an artifact coordinate (or back).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("The {layout} layout has no {what}")]
    Unsupported {
        layout: &'static str,
        what: &'static str,
    },
}

impl LayoutError {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        LayoutError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Bidirectional mapping between coordinates and relative paths.
pub trait RepositoryLayout: Send + Sync {
    fn id(&self) -> &'static str;

    /// Relative path of the artifact file.
    fn to_path(&self, reference: &ArtifactReference) -> String;

    /// Parse a relative path into a coordinate.
    fn to_artifact_reference(&self, path: &str) -> Result<ArtifactReference, LayoutError>;

    /// Relative directory holding every build of a version.
    fn to_versioned_path(&self, reference: &VersionedReference) -> Result<String, LayoutError>;

    /// Relative directory holding every version of a project.
    fn to_project_path(&self, reference: &ProjectReference) -> Result<String, LayoutError>;

    /// Whether this layout carries `maven-metadata.xml` files.
    fn supports_metadata(&self) -> bool {
        true
    }
}

/// Get the layout implementation for a configured layout kind.
pub fn get_layout(kind: LayoutKind) -> &'static dyn RepositoryLayout {
    static DEFAULT: maven::DefaultLayout = maven::DefaultLayout;
    static LEGACY: legacy::LegacyLayout = legacy::LegacyLayout;
    match kind {
        LayoutKind::Default => &DEFAULT,
        LayoutKind::Legacy => &LEGACY,
    }
}

/// File extension written for an artifact type.
pub fn extension_for_type(artifact_type: &str) -> &str {
    match artifact_type {
        "maven-plugin" | "maven-archetype" | "ejb" | "ejb-client" | "java-source" | "javadoc"
        | "test-jar" | "maven-one-plugin" | "aspect" | "uberjar" | "bundle" => "jar",
        "distribution-tgz" => "tar.gz",
        "distribution-zip" => "zip",
        other => other,
    }
}

/// Best guess of the artifact type from classifier and extension.
pub fn type_for(classifier: Option<&str>, extension: &str) -> String {
    match (classifier, extension) {
        (Some("sources"), "jar") => "java-source".to_string(),
        (Some("javadoc"), "jar") => "javadoc".to_string(),
        (Some("tests"), "jar") => "test-jar".to_string(),
        (_, "tar.gz") => "distribution-tgz".to_string(),
        (_, ext) => ext.to_string(),
    }
}

/// Split a filename into stem and extension, honouring compound extensions.
pub fn split_extension(filename: &str) -> Option<(&str, &str)> {
    for compound in COMPOUND_EXTENSIONS {
        if let Some(stem) = filename
            .strip_suffix(compound)
            .and_then(|s| s.strip_suffix('.'))
        {
            return Some((stem, &filename[stem.len() + 1..]));
        }
    }
    let dot = filename.rfind('.')?;
    let (stem, ext) = (&filename[..dot], &filename[dot + 1..]);
    if ext.is_empty() {
        None
    } else {
        Some((stem, ext))
    }
}

pub fn filename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `maven-metadata.xml` or a proxied `maven-metadata-<remote>.xml`.
pub fn is_metadata_path(path: &str) -> bool {
    let name = filename(path);
    name == METADATA_FILENAME || (name.starts_with("maven-metadata-") && name.ends_with(".xml"))
}

/// Checksum side-file, returning the path of the file it covers.
pub fn checksum_reference(path: &str) -> Option<&str> {
    CHECKSUM_EXTENSIONS.iter().find_map(|ext| {
        path.strip_suffix(ext)
            .and_then(|p| p.strip_suffix('.'))
            .filter(|p| !p.is_empty() && !p.ends_with('/'))
    })
}

pub fn is_checksum_path(path: &str) -> bool {
    checksum_reference(path).is_some()
}

/// Relative path with a leading slash and backslashes normalised away.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for_type("maven-plugin"), "jar");
        assert_eq!(extension_for_type("distribution-tgz"), "tar.gz");
        assert_eq!(extension_for_type("distribution-zip"), "zip");
        assert_eq!(extension_for_type("pom"), "pom");
    }

    #[test]
    fn test_type_inference() {
        assert_eq!(type_for(Some("sources"), "jar"), "java-source");
        assert_eq!(type_for(Some("javadoc"), "jar"), "javadoc");
        assert_eq!(type_for(Some("bin"), "tar.gz"), "distribution-tgz");
        assert_eq!(type_for(None, "pom"), "pom");
        assert_eq!(type_for(Some("jdk14"), "jar"), "jar");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a-1.0.jar"), Some(("a-1.0", "jar")));
        assert_eq!(split_extension("a-1.0-bin.tar.gz"), Some(("a-1.0-bin", "tar.gz")));
        assert_eq!(split_extension("noext"), None);
        assert_eq!(split_extension("trailing."), None);
    }

    #[test]
    fn test_path_classification() {
        assert!(is_metadata_path("org/example/lib/maven-metadata.xml"));
        assert!(is_metadata_path("org/example/lib/maven-metadata-central.xml"));
        assert!(!is_metadata_path("org/example/lib/1.0/lib-1.0.pom"));
        assert_eq!(
            checksum_reference("org/example/lib/1.0/lib-1.0.jar.sha1"),
            Some("org/example/lib/1.0/lib-1.0.jar")
        );
        assert_eq!(checksum_reference("org/example/lib/1.0/lib-1.0.jar"), None);
        assert!(is_checksum_path("org/example/lib/maven-metadata.xml.md5"));
    }

    #[test]
    fn test_get_layout() {
        assert_eq!(get_layout(LayoutKind::Default).id(), "default");
        assert_eq!(get_layout(LayoutKind::Legacy).id(), "legacy");
        assert!(!get_layout(LayoutKind::Legacy).supports_metadata());
    }
}
