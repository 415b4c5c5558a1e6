//! Repository configuration registry.
//!
//! Holds the current [`RepositoryConfiguration`] as an immutable snapshot.
//! Every change produces a new snapshot with a higher generation, published on
//! a `watch` channel, and a [`ConfigurationEvent`] on the event bus.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};

use crate::error::{AppError, Result};
use crate::models::proxy_connector::ProxyConnectorConfiguration;
use crate::models::repository::{ManagedRepository, RemoteRepository, RepositoryConfiguration};
use crate::services::event_bus::{properties, ConfigurationEvent, EventBus};

const EVENT_CAPACITY: usize = 64;

/// One immutable version of the configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationSnapshot {
    pub generation: u64,
    pub config: RepositoryConfiguration,
}

/// Repository configuration registry
pub struct RepositoryRegistry {
    current: watch::Sender<Arc<ConfigurationSnapshot>>,
    events: EventBus,
    write_lock: Mutex<()>,
}

impl RepositoryRegistry {
    pub fn new(config: RepositoryConfiguration) -> Result<Self> {
        config.validate()?;
        let (current, _) = watch::channel(Arc::new(ConfigurationSnapshot {
            generation: 1,
            config,
        }));
        Ok(Self {
            current,
            events: EventBus::new(EVENT_CAPACITY),
            write_lock: Mutex::new(()),
        })
    }

    /// Load a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = RepositoryConfiguration::from_json(&content)?;
        tracing::info!(
            path = %path.display(),
            managed = config.managed_repositories.len(),
            remote = config.remote_repositories.len(),
            connectors = config.proxy_connectors.len(),
            "Loaded repository configuration"
        );
        Self::new(config)
    }

    pub fn snapshot(&self) -> Arc<ConfigurationSnapshot> {
        self.current.borrow().clone()
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<Arc<ConfigurationSnapshot>> {
        self.current.subscribe()
    }

    /// Subscribe to configuration change events.
    pub fn add_change_listener(&self) -> broadcast::Receiver<ConfigurationEvent> {
        self.events.subscribe()
    }

    pub fn managed_repository(&self, id: &str) -> Option<ManagedRepository> {
        self.current.borrow().config.managed(id).cloned()
    }

    pub fn remote_repository(&self, id: &str) -> Option<RemoteRepository> {
        self.current.borrow().config.remote(id).cloned()
    }

    pub fn managed_repositories(&self) -> Vec<ManagedRepository> {
        self.current.borrow().config.managed_repositories.clone()
    }

    /// Add or replace a managed repository.
    pub fn save_managed_repository(&self, repository: ManagedRepository) -> Result<()> {
        let id = repository.id.clone();
        self.update(properties::MANAGED_REPOSITORIES, &id, |config| {
            if config.remote(&repository.id).is_some() {
                return Err(AppError::Conflict(format!(
                    "'{}' is already a remote repository",
                    repository.id
                )));
            }
            match config.managed_repositories.iter_mut().find(|r| r.id == repository.id) {
                Some(existing) => *existing = repository,
                None => config.managed_repositories.push(repository),
            }
            Ok(())
        })
    }

    /// Add or replace a remote repository.
    pub fn save_remote_repository(&self, repository: RemoteRepository) -> Result<()> {
        let id = repository.id.clone();
        self.update(properties::REMOTE_REPOSITORIES, &id, |config| {
            if config.managed(&repository.id).is_some() {
                return Err(AppError::Conflict(format!(
                    "'{}' is already a managed repository",
                    repository.id
                )));
            }
            match config.remote_repositories.iter_mut().find(|r| r.id == repository.id) {
                Some(existing) => *existing = repository,
                None => config.remote_repositories.push(repository),
            }
            Ok(())
        })
    }

    /// Add or replace the connector between its source and target.
    pub fn save_proxy_connector(&self, connector: ProxyConnectorConfiguration) -> Result<()> {
        let value = format!("{}->{}", connector.source_repo_id, connector.target_repo_id);
        self.update(properties::PROXY_CONNECTORS, &value, |config| {
            match config
                .proxy_connectors
                .iter_mut()
                .find(|c| c.key() == connector.key())
            {
                Some(existing) => *existing = connector,
                None => config.proxy_connectors.push(connector),
            }
            Ok(())
        })
    }

    pub fn remove_proxy_connector(&self, source_repo_id: &str, target_repo_id: &str) -> Result<()> {
        let value = format!("{}->{}", source_repo_id, target_repo_id);
        self.update(properties::PROXY_CONNECTORS, &value, |config| {
            let before = config.proxy_connectors.len();
            config
                .proxy_connectors
                .retain(|c| c.key() != (source_repo_id, target_repo_id));
            if config.proxy_connectors.len() == before {
                return Err(AppError::NotFound(format!("proxy connector {}", value)));
            }
            Ok(())
        })
    }

    /// Swap in a whole new configuration.
    pub fn replace(&self, config: RepositoryConfiguration) -> Result<()> {
        self.update(properties::CONFIGURATION, "", move |current| {
            *current = config;
            Ok(())
        })
    }

    fn update<F>(&self, property: &str, value: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut RepositoryConfiguration) -> Result<()>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.snapshot();
        let mut config = current.config.clone();
        change(&mut config)?;
        config.validate()?;

        let generation = current.generation + 1;
        self.current.send_replace(Arc::new(ConfigurationSnapshot { generation, config }));
        tracing::debug!(property, value, generation, "Configuration changed");
        self.events
            .publish(ConfigurationEvent::now(property, value, generation));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RepositoryRegistry {
        RepositoryRegistry::new(RepositoryConfiguration {
            managed_repositories: vec![ManagedRepository::new("internal", "/tmp/internal")],
            remote_repositories: vec![RemoteRepository::new("central", "http://localhost/central")],
            proxy_connectors: vec![],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_connector_publishes_snapshot_and_event() {
        let registry = registry();
        let mut events = registry.add_change_listener();
        let mut watch = registry.watch();
        assert_eq!(registry.snapshot().generation, 1);

        registry
            .save_proxy_connector(ProxyConnectorConfiguration::new("internal", "central"))
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.property, properties::PROXY_CONNECTORS);
        assert_eq!(event.value, "internal->central");
        assert_eq!(event.generation, 2);

        watch.changed().await.unwrap();
        assert_eq!(watch.borrow().generation, 2);
        assert_eq!(watch.borrow().config.proxy_connectors.len(), 1);
    }

    #[test]
    fn test_save_connector_replaces_existing() {
        let registry = registry();
        registry
            .save_proxy_connector(ProxyConnectorConfiguration::new("internal", "central"))
            .unwrap();
        registry
            .save_proxy_connector(ProxyConnectorConfiguration::new("internal", "central").with_order(4))
            .unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.config.proxy_connectors.len(), 1);
        assert_eq!(snapshot.config.proxy_connectors[0].order, Some(4));
    }

    #[test]
    fn test_invalid_change_is_rejected_without_new_generation() {
        let registry = registry();
        let result = registry.save_proxy_connector(ProxyConnectorConfiguration::new("internal", "missing"));
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(registry.snapshot().generation, 1);
    }

    #[test]
    fn test_remove_unknown_connector() {
        let registry = registry();
        assert!(matches!(
            registry.remove_proxy_connector("internal", "central"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_id_collision_between_kinds() {
        let registry = registry();
        let result = registry.save_remote_repository(RemoteRepository::new("internal", "http://x"));
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.json");
        std::fs::write(
            &path,
            r#"{
                "managedRepositories": [{"id": "internal", "location": "/srv/internal"}],
                "remoteRepositories": [{"id": "central", "url": "https://repo1.maven.org/maven2"}],
                "proxyConnectors": [{"sourceRepoId": "internal", "targetRepoId": "central", "order": 1}]
            }"#,
        )
        .unwrap();
        let registry = RepositoryRegistry::load(&path).unwrap();
        assert!(registry.managed_repository("internal").is_some());
        assert!(registry.remote_repository("central").is_some());
        assert!(matches!(
            RepositoryRegistry::load(&dir.path().join("missing.json")),
            Err(AppError::Config(_))
        ));
    }
}
