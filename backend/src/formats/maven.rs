//! Maven 2 (`default`) repository layout.
//!
//! Path format: `groupId(as dirs)/artifactId/baseVersion/artifactId-version[-classifier].extension`.
//! Also reads and writes `maven-metadata.xml`.

use std::sync::OnceLock;

use quick_xml::de::from_str;
use quick_xml::escape::escape;
use regex::Regex;
use serde::Deserialize;

use crate::formats::version::{self, SNAPSHOT};
use crate::formats::{extension_for_type, split_extension, type_for, LayoutError, RepositoryLayout};
use crate::models::artifact::{ArtifactReference, ProjectReference, VersionedReference};
use crate::models::metadata::{RepositoryMetadata, SnapshotVersion};

fn timestamp_build_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{8}\.[0-9]{6}-[0-9]+").expect("valid build regex"))
}

/// Maven 2 layout
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLayout;

impl DefaultLayout {
    /// Resolve the version embedded in `remainder` (the filename after
    /// `artifactId-`) against the version directory.
    fn resolve_version<'a>(remainder: &'a str, base_version: &str) -> Option<&'a str> {
        if remainder.starts_with(base_version) {
            return Some(&remainder[..base_version.len()]);
        }
        // Timestamped build inside a -SNAPSHOT directory.
        let prefix = base_version.strip_suffix(SNAPSHOT)?;
        let after = remainder.strip_prefix(prefix)?;
        let build = timestamp_build_pattern().find(after)?;
        Some(&remainder[..prefix.len() + build.end()])
    }
}

impl RepositoryLayout for DefaultLayout {
    fn id(&self) -> &'static str {
        "default"
    }

    fn to_path(&self, reference: &ArtifactReference) -> String {
        let mut path = format!(
            "{}/{}/{}/{}-{}",
            reference.group_id.replace('.', "/"),
            reference.artifact_id,
            reference.base_version(),
            reference.artifact_id,
            reference.version
        );
        if let Some(classifier) = &reference.classifier {
            path.push('-');
            path.push_str(classifier);
        }
        path.push('.');
        path.push_str(extension_for_type(&reference.artifact_type));
        path
    }

    fn to_artifact_reference(&self, path: &str) -> Result<ArtifactReference, LayoutError> {
        let trimmed = path.trim_start_matches('/');
        let parts: Vec<&str> = trimmed.split('/').collect();

        if parts.len() < 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(LayoutError::invalid(
                path,
                "expected groupId/artifactId/version/filename",
            ));
        }

        let filename = parts[parts.len() - 1];
        let base_version = parts[parts.len() - 2];
        let artifact_id = parts[parts.len() - 3];
        let group_id = parts[..parts.len() - 3].join(".");

        let remainder = filename
            .strip_prefix(artifact_id)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(|| {
                LayoutError::invalid(
                    path,
                    format!("filename does not start with '{}-'", artifact_id),
                )
            })?;

        let version = Self::resolve_version(remainder, base_version).ok_or_else(|| {
            LayoutError::invalid(
                path,
                format!("filename version does not match directory '{}'", base_version),
            )
        })?;

        let rest = &remainder[version.len()..];
        let (classifier, extension) = if let Some(ext) = rest.strip_prefix('.') {
            // `lib-1.0.1.jar` in `1.0/` is a different version, not extension `1.jar`.
            if ext.split(['.', '-']).next().is_some_and(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())) {
                return Err(LayoutError::invalid(
                    path,
                    format!("filename version does not match directory '{}'", base_version),
                ));
            }
            (None, ext)
        } else if let Some(tail) = rest.strip_prefix('-') {
            let (classifier, ext) = split_extension(tail)
                .ok_or_else(|| LayoutError::invalid(path, "missing extension"))?;
            if classifier.is_empty() {
                return Err(LayoutError::invalid(path, "empty classifier"));
            }
            (Some(classifier), ext)
        } else if rest.is_empty() {
            return Err(LayoutError::invalid(path, "missing extension"));
        } else {
            return Err(LayoutError::invalid(
                path,
                format!("filename version does not match directory '{}'", base_version),
            ));
        };

        if extension.is_empty() {
            return Err(LayoutError::invalid(path, "missing extension"));
        }

        Ok(ArtifactReference::new(
            group_id,
            artifact_id,
            version,
            classifier,
            type_for(classifier, extension),
        ))
    }

    fn to_versioned_path(&self, reference: &VersionedReference) -> Result<String, LayoutError> {
        Ok(format!(
            "{}/{}/{}",
            reference.group_id.replace('.', "/"),
            reference.artifact_id,
            version::base_version(&reference.version)
        ))
    }

    fn to_project_path(&self, reference: &ProjectReference) -> Result<String, LayoutError> {
        Ok(format!(
            "{}/{}",
            reference.group_id.replace('.', "/"),
            reference.artifact_id
        ))
    }
}

// ---------------------------------------------------------------------------
// maven-metadata.xml
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename = "metadata")]
struct XmlMetadata {
    #[serde(rename = "groupId")]
    group_id: Option<String>,
    #[serde(rename = "artifactId")]
    artifact_id: Option<String>,
    version: Option<String>,
    versioning: Option<XmlVersioning>,
}

#[derive(Debug, Default, Deserialize)]
struct XmlVersioning {
    latest: Option<String>,
    release: Option<String>,
    snapshot: Option<XmlSnapshot>,
    versions: Option<XmlVersions>,
    #[serde(rename = "lastUpdated")]
    last_updated: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct XmlSnapshot {
    timestamp: Option<String>,
    #[serde(rename = "buildNumber")]
    build_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct XmlVersions {
    #[serde(default)]
    version: Vec<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `maven-metadata.xml` content. Unknown elements (plugins,
/// snapshotVersions) are ignored.
pub fn parse_metadata_xml(content: &str) -> Result<RepositoryMetadata, quick_xml::DeError> {
    let xml: XmlMetadata = from_str(content)?;
    let versioning = xml.versioning.unwrap_or_default();

    let mut available_versions: Vec<String> = versioning
        .versions
        .map(|v| v.version)
        .unwrap_or_default()
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    version::sort_versions(&mut available_versions);

    let snapshot_version = versioning.snapshot.and_then(|s| {
        let timestamp = non_empty(s.timestamp);
        let build_number = non_empty(s.build_number).and_then(|b| b.parse().ok());
        match (timestamp, build_number) {
            (None, None) => None,
            (timestamp, build_number) => Some(SnapshotVersion {
                timestamp,
                build_number: build_number.unwrap_or(0),
            }),
        }
    });

    Ok(RepositoryMetadata {
        group_id: non_empty(xml.group_id),
        artifact_id: non_empty(xml.artifact_id),
        version: non_empty(xml.version),
        latest_version: non_empty(versioning.latest),
        released_version: non_empty(versioning.release),
        available_versions,
        snapshot_version,
        last_updated: non_empty(versioning.last_updated),
    })
}

/// Generate maven-metadata.xml content
pub fn write_metadata_xml(metadata: &RepositoryMetadata) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata>\n");

    let element = |xml: &mut String, indent: &str, name: &str, value: &Option<String>| {
        if let Some(v) = value {
            xml.push_str(&format!("{}<{}>{}</{}>\n", indent, name, escape(v.as_str()), name));
        }
    };

    element(&mut xml, "  ", "groupId", &metadata.group_id);
    element(&mut xml, "  ", "artifactId", &metadata.artifact_id);
    element(&mut xml, "  ", "version", &metadata.version);

    let has_versioning = metadata.latest_version.is_some()
        || metadata.released_version.is_some()
        || metadata.snapshot_version.is_some()
        || !metadata.available_versions.is_empty()
        || metadata.last_updated.is_some();

    if has_versioning {
        xml.push_str("  <versioning>\n");
        element(&mut xml, "    ", "latest", &metadata.latest_version);
        element(&mut xml, "    ", "release", &metadata.released_version);
        if let Some(snapshot) = &metadata.snapshot_version {
            xml.push_str("    <snapshot>\n");
            element(&mut xml, "      ", "timestamp", &snapshot.timestamp);
            xml.push_str(&format!(
                "      <buildNumber>{}</buildNumber>\n",
                snapshot.build_number
            ));
            xml.push_str("    </snapshot>\n");
        }
        if !metadata.available_versions.is_empty() {
            xml.push_str("    <versions>\n");
            for v in &metadata.available_versions {
                xml.push_str(&format!("      <version>{}</version>\n", escape(v.as_str())));
            }
            xml.push_str("    </versions>\n");
        }
        element(&mut xml, "    ", "lastUpdated", &metadata.last_updated);
        xml.push_str("  </versioning>\n");
    }

    xml.push_str("</metadata>\n");
    xml
}
