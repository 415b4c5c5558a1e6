//! Proxy connector resolution.
//!
//! Turns connector configuration into ready-to-use [`ProxyConnector`]s per
//! managed repository: ordered, targets resolved, policies parsed and path
//! patterns compiled. Results are cached per configuration generation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tokio::sync::watch;

use crate::models::proxy_connector::{sort_connectors, ProxyConnectorConfiguration};
use crate::models::repository::{RemoteRepository, RepositoryConfiguration};
use crate::services::policies::{DownloadPolicies, InvalidPolicyOption};
use crate::services::repository_service::ConfigurationSnapshot;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error(transparent)]
    InvalidPolicy(#[from] InvalidPolicyOption),

    #[error("Invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Unknown remote repository '{0}'")]
    UnknownTarget(String),
}

/// A resolved connector from a managed repository to a remote one.
#[derive(Debug)]
pub struct ProxyConnector {
    pub source_repo_id: String,
    pub target: Arc<RemoteRepository>,
    pub order: Option<i32>,
    pub policies: DownloadPolicies,
    blacklist: GlobSet,
    whitelist: GlobSet,
}

impl ProxyConnector {
    pub fn from_configuration(
        config: &ProxyConnectorConfiguration,
        target: Arc<RemoteRepository>,
    ) -> Result<Self, ConnectorError> {
        Ok(Self {
            source_repo_id: config.source_repo_id.clone(),
            target,
            order: config.order,
            policies: DownloadPolicies::from_options(&config.policies)?,
            blacklist: compile_patterns(&config.blacklist)?,
            whitelist: compile_patterns(&config.whitelist)?,
        })
    }

    pub fn target_id(&self) -> &str {
        &self.target.id
    }

    /// A path is eligible when no blacklist pattern matches it and the
    /// whitelist is empty or matches it.
    pub fn is_path_allowed(&self, path: &str) -> bool {
        let path = path.replace('\\', "/");
        let path = path.trim_start_matches('/');
        if self.blacklist.is_match(path) {
            return false;
        }
        self.whitelist.is_empty() || self.whitelist.is_match(path)
    }
}

/// Ant-style pattern (`**`, `*`, `?`) to a glob. A trailing `/` means
/// "everything below".
fn normalize_pattern(pattern: &str) -> String {
    let mut pattern = pattern.trim().replace('\\', "/");
    pattern = pattern.trim_start_matches('/').to_string();
    if pattern.ends_with('/') {
        pattern.push_str("**");
    }
    pattern
}

fn compile_patterns(patterns: &[String]) -> Result<GlobSet, ConnectorError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let normalized = normalize_pattern(pattern);
        if normalized.is_empty() {
            continue;
        }
        let glob: Glob = GlobBuilder::new(&normalized)
            .literal_separator(true)
            .build()
            .map_err(|source| ConnectorError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ConnectorError::InvalidPattern {
        pattern: patterns.join(","),
        source,
    })
}

type ConnectorMap = HashMap<String, Vec<Arc<ProxyConnector>>>;

/// Build ordered connectors for every managed repository. Invalid connectors
/// are skipped with a warning.
pub fn resolve_connectors(config: &RepositoryConfiguration) -> ConnectorMap {
    let mut ordered: Vec<ProxyConnectorConfiguration> = config
        .proxy_connectors
        .iter()
        .filter(|c| !c.disabled)
        .cloned()
        .collect();
    sort_connectors(&mut ordered);

    let mut targets: HashMap<&str, Arc<RemoteRepository>> = HashMap::new();
    let mut map = ConnectorMap::new();
    for connector in &ordered {
        let target = match config.remote(&connector.target_repo_id) {
            Some(remote) => targets
                .entry(remote.id.as_str())
                .or_insert_with(|| Arc::new(remote.clone()))
                .clone(),
            None => {
                tracing::warn!(
                    source = %connector.source_repo_id,
                    remote = %connector.target_repo_id,
                    error = %ConnectorError::UnknownTarget(connector.target_repo_id.clone()),
                    "Skipping proxy connector"
                );
                continue;
            }
        };

        match ProxyConnector::from_configuration(connector, target) {
            Ok(resolved) => map
                .entry(connector.source_repo_id.clone())
                .or_default()
                .push(Arc::new(resolved)),
            Err(e) => tracing::warn!(
                source = %connector.source_repo_id,
                remote = %connector.target_repo_id,
                error = %e,
                "Skipping invalid proxy connector"
            ),
        }
    }
    map
}

/// Connector lookup that follows configuration changes.
pub struct ConnectorResolver {
    config: watch::Receiver<Arc<ConfigurationSnapshot>>,
    cache: Mutex<Option<(u64, Arc<ConnectorMap>)>>,
}

impl ConnectorResolver {
    pub fn new(config: watch::Receiver<Arc<ConfigurationSnapshot>>) -> Self {
        Self {
            config,
            cache: Mutex::new(None),
        }
    }

    fn current(&self) -> Arc<ConnectorMap> {
        let snapshot = self.config.borrow().clone();
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((generation, map)) = cache.as_ref() {
            if *generation == snapshot.generation {
                return map.clone();
            }
        }
        let map = Arc::new(resolve_connectors(&snapshot.config));
        tracing::debug!(generation = snapshot.generation, "Rebuilt proxy connector cache");
        *cache = Some((snapshot.generation, map.clone()));
        map
    }

    /// Ordered connectors of a managed repository.
    pub fn connectors_for(&self, managed_id: &str) -> Vec<Arc<ProxyConnector>> {
        self.current().get(managed_id).cloned().unwrap_or_default()
    }

    pub fn has_connectors(&self, managed_id: &str) -> bool {
        self.current().get(managed_id).is_some_and(|c| !c.is_empty())
    }
}
