//! Repository configuration model.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::proxy_connector::ProxyConnectorConfiguration;

/// Path layout of a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Default,
    Legacy,
}

impl LayoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutKind::Default => "default",
            LayoutKind::Legacy => "legacy",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_days_older() -> u32 {
    100
}

fn default_retention_count() -> u32 {
    2
}

fn default_refresh_cron() -> String {
    "0 0 * * * ?".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// A repository stored on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedRepository {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub location: PathBuf,
    #[serde(default)]
    pub layout: LayoutKind,
    #[serde(default = "default_true")]
    pub releases: bool,
    #[serde(default)]
    pub snapshots: bool,
    #[serde(default)]
    pub block_redeployments: bool,
    /// Snapshot builds older than this many days are purged; `0` switches to
    /// count-based retention.
    #[serde(default = "default_days_older")]
    pub days_older: u32,
    #[serde(default = "default_retention_count")]
    pub retention_count: u32,
    #[serde(default)]
    pub delete_released_snapshots: bool,
    #[serde(default = "default_refresh_cron")]
    pub refresh_cron_expression: String,
}

impl ManagedRepository {
    pub fn new(id: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            location: location.into(),
            layout: LayoutKind::Default,
            releases: true,
            snapshots: false,
            block_redeployments: false,
            days_older: default_days_older(),
            retention_count: default_retention_count(),
            delete_released_snapshots: false,
            refresh_cron_expression: default_refresh_cron(),
        }
    }
}

/// A repository reachable over a transport.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepository {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub layout: LayoutKind,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

redacted_debug!(RemoteRepository {
    show id,
    show name,
    show url,
    show layout,
    show username,
    redact_option password,
    show timeout_secs,
});

impl RemoteRepository {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            url: url.into(),
            layout: LayoutKind::Default,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Everything the proxy and purge subsystems read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfiguration {
    #[serde(default)]
    pub managed_repositories: Vec<ManagedRepository>,
    #[serde(default)]
    pub remote_repositories: Vec<RemoteRepository>,
    #[serde(default)]
    pub proxy_connectors: Vec<ProxyConnectorConfiguration>,
}

impl RepositoryConfiguration {
    /// Load from a JSON document.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn managed(&self, id: &str) -> Option<&ManagedRepository> {
        self.managed_repositories.iter().find(|r| r.id == id)
    }

    pub fn remote(&self, id: &str) -> Option<&RemoteRepository> {
        self.remote_repositories.iter().find(|r| r.id == id)
    }

    /// Check id uniqueness and that connectors point at known repositories.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for id in self
            .managed_repositories
            .iter()
            .map(|r| &r.id)
            .chain(self.remote_repositories.iter().map(|r| &r.id))
        {
            if id.is_empty() {
                return Err(AppError::Validation("repository id must not be empty".into()));
            }
            if !ids.insert(id.as_str()) {
                return Err(AppError::Conflict(format!("duplicate repository id '{}'", id)));
            }
        }

        for connector in &self.proxy_connectors {
            if self.managed(&connector.source_repo_id).is_none() {
                return Err(AppError::Validation(format!(
                    "proxy connector source '{}' is not a managed repository",
                    connector.source_repo_id
                )));
            }
            if self.remote(&connector.target_repo_id).is_none() {
                return Err(AppError::Validation(format!(
                    "proxy connector target '{}' is not a remote repository",
                    connector.target_repo_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_repository_defaults() {
        let repo: ManagedRepository =
            serde_json::from_str(r#"{"id": "internal", "location": "/var/repo"}"#).unwrap();
        assert!(repo.releases);
        assert!(!repo.snapshots);
        assert_eq!(repo.days_older, 100);
        assert_eq!(repo.retention_count, 2);
        assert!(!repo.delete_released_snapshots);
        assert_eq!(repo.refresh_cron_expression, "0 0 * * * ?");
        assert_eq!(repo.layout, LayoutKind::Default);
    }

    #[test]
    fn test_remote_repository_debug_redacts_password() {
        let mut remote = RemoteRepository::new("central", "https://repo1.maven.org/maven2");
        remote.username = Some("deployer".into());
        remote.password = Some("hunter2".into());
        let output = format!("{:?}", remote);
        assert!(output.contains("deployer"));
        assert!(!output.contains("hunter2"));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let config = RepositoryConfiguration {
            managed_repositories: vec![ManagedRepository::new("dup", "/tmp/a")],
            remote_repositories: vec![RemoteRepository::new("dup", "http://localhost")],
            proxy_connectors: vec![],
        };
        assert!(matches!(config.validate(), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_connector_target() {
        let config = RepositoryConfiguration {
            managed_repositories: vec![ManagedRepository::new("internal", "/tmp/a")],
            remote_repositories: vec![],
            proxy_connectors: vec![ProxyConnectorConfiguration::new("internal", "central")],
        };
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_layout_from_json() {
        let remote: RemoteRepository = serde_json::from_str(
            r#"{"id": "legacy", "url": "http://localhost/m1", "layout": "legacy"}"#,
        )
        .unwrap();
        assert_eq!(remote.layout, LayoutKind::Legacy);
        assert_eq!(remote.timeout_secs, 60);
    }
}
