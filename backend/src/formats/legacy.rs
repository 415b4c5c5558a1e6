//! Maven 1 (`legacy`) repository layout.
//!
//! Path format: `groupId/<type>s/artifactId-version[-classifier].extension`.
//! The version is not a path segment, so it is recovered from the filename by
//! treating the first token that looks like a version as its start.

use crate::formats::{extension_for_type, split_extension, LayoutError, RepositoryLayout};
use crate::models::artifact::{ArtifactReference, ProjectReference, VersionedReference};

/// Maven 1 layout
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyLayout;

/// Directory name (before pluralising) for a type.
pub fn type_directory(artifact_type: &str) -> &str {
    match artifact_type {
        "ejb-client" => "ejb",
        "maven-one-plugin" => "plugin",
        "distribution-tgz" | "distribution-zip" => "distribution",
        "javadoc" => "javadoc.jar",
        other => other,
    }
}

fn is_qualifier_token(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    let word = lower.trim_end_matches(|c: char| c.is_ascii_digit());
    matches!(
        word,
        "snapshot" | "alpha" | "beta" | "rc" | "m" | "cr" | "sp" | "final" | "ga" | "dev"
    ) && !(word == "m" && word.len() == lower.len())
}

fn is_version_start(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit()) || token.eq_ignore_ascii_case("SNAPSHOT")
}

fn is_version_token(token: &str) -> bool {
    is_version_start(token) || is_qualifier_token(token)
}

/// Split `artifactId-version[-classifier]` into its three parts.
fn split_name(stem: &str) -> Option<(String, String, Option<String>)> {
    let tokens: Vec<&str> = stem.split('-').collect();
    let version_start = tokens
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, t)| is_version_start(t))
        .map(|(i, _)| i)?;
    let version_end = tokens[version_start..]
        .iter()
        .position(|t| !is_version_token(t))
        .map(|p| version_start + p)
        .unwrap_or(tokens.len());

    let artifact_id = tokens[..version_start].join("-");
    let version = tokens[version_start..version_end].join("-");
    let classifier = if version_end < tokens.len() {
        Some(tokens[version_end..].join("-"))
    } else {
        None
    };
    if artifact_id.is_empty() || version.is_empty() {
        return None;
    }
    Some((artifact_id, version, classifier))
}

impl RepositoryLayout for LegacyLayout {
    fn id(&self) -> &'static str {
        "legacy"
    }

    fn to_path(&self, reference: &ArtifactReference) -> String {
        let mut path = format!(
            "{}/{}s/{}-{}",
            reference.group_id,
            type_directory(&reference.artifact_type),
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
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(LayoutError::invalid(
                path,
                "expected groupId/<type>s/filename",
            ));
        }

        let group_id = parts[0];
        let directory = parts[1]
            .strip_suffix('s')
            .ok_or_else(|| LayoutError::invalid(path, format!("type directory '{}' should end with 's'", parts[1])))?;
        let filename = parts[2];

        let (stem, extension) = split_extension(filename)
            .ok_or_else(|| LayoutError::invalid(path, "missing extension"))?;
        let (artifact_id, version, classifier) = split_name(stem)
            .ok_or_else(|| LayoutError::invalid(path, "unable to detect artifactId and version"))?;

        let artifact_type = match (directory, classifier.as_deref(), extension) {
            ("javadoc.jar", _, _) => "javadoc".to_string(),
            ("plugin", _, "jar") => "maven-one-plugin".to_string(),
            ("ejb", Some("client"), _) => "ejb-client".to_string(),
            ("distribution", _, "tar.gz") => "distribution-tgz".to_string(),
            ("distribution", _, "zip") => "distribution-zip".to_string(),
            (dir, _, _) => dir.to_string(),
        };

        let expected = extension_for_type(&artifact_type);
        if expected != extension {
            return Err(LayoutError::invalid(
                path,
                format!(
                    "extension '{}' does not match type directory '{}' (expected '{}')",
                    extension, parts[1], expected
                ),
            ));
        }

        Ok(ArtifactReference::new(
            group_id,
            artifact_id,
            version,
            classifier.as_deref(),
            artifact_type,
        ))
    }

    fn to_versioned_path(&self, _reference: &VersionedReference) -> Result<String, LayoutError> {
        Err(LayoutError::Unsupported {
            layout: "legacy",
            what: "version directories",
        })
    }

    fn to_project_path(&self, _reference: &ProjectReference) -> Result<String, LayoutError> {
        Err(LayoutError::Unsupported {
            layout: "legacy",
            what: "project directories",
        })
    }

    fn supports_metadata(&self) -> bool {
        false
    }
}
