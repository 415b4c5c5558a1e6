//! Shared fixtures for the proxy and purge integration tests.
//!
//! - `MockTransport` serves canned remote content and records every request
//! - `ProxyFixture` wires a managed repository, two remotes and a handler
//!   over a temporary directory

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tempfile::TempDir;

use maven_proxy::models::proxy_connector::ProxyConnectorConfiguration;
use maven_proxy::models::repository::{ManagedRepository, RemoteRepository, RepositoryConfiguration};
use maven_proxy::services::failure_cache::UrlFailureCache;
use maven_proxy::services::metadata_service::MetadataStore;
use maven_proxy::services::proxy_service::RepositoryProxyHandler;
use maven_proxy::services::repository_service::RepositoryRegistry;
use maven_proxy::services::transport::{RemoteTransport, TransportError};
use maven_proxy::storage::filesystem::is_staging_name;

pub const MANAGED: &str = "internal";
pub const CENTRAL: &str = "central";
pub const MIRROR: &str = "mirror";

#[derive(Clone)]
enum Response {
    Content(Vec<u8>),
    Error(String),
}

/// In-memory remote repositories keyed by `(remote id, path)`. Anything not
/// registered answers "not found".
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<(String, String), Response>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn serve(&self, remote: &str, path: &str, content: impl AsRef<[u8]>) {
        self.responses.lock().unwrap().insert(
            (remote.to_string(), path.to_string()),
            Response::Content(content.as_ref().to_vec()),
        );
    }

    /// Serve a file along with a correct `.sha1` side-file.
    pub fn serve_with_sha1(&self, remote: &str, path: &str, content: impl AsRef<[u8]>) {
        let content = content.as_ref();
        self.serve(remote, path, content);
        self.serve(remote, &format!("{}.sha1", path), sha1_hex(content));
    }

    pub fn fail(&self, remote: &str, path: &str, reason: &str) {
        self.responses.lock().unwrap().insert(
            (remote.to_string(), path.to_string()),
            Response::Error(reason.to_string()),
        );
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, remote: &str, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, p)| r == remote && p == path)
            .count()
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn fetch(&self, remote: &RemoteRepository, path: &str, destination: &Path) -> Result<(), TransportError> {
        let key = (remote.id.clone(), path.to_string());
        self.requests.lock().unwrap().push(key.clone());

        let response = self.responses.lock().unwrap().get(&key).cloned();
        match response {
            Some(Response::Content(content)) => {
                tokio::fs::write(destination, content).await?;
                Ok(())
            }
            Some(Response::Error(reason)) => Err(TransportError::Failed {
                url: format!("{}/{}", remote.url, path),
                reason,
            }),
            None => Err(TransportError::NotFound(format!("{}/{}", remote.url, path))),
        }
    }
}

/// Connector from the managed repository to `target`.
pub fn connector(target: &str, order: i32) -> ProxyConnectorConfiguration {
    ProxyConnectorConfiguration::new(MANAGED, target).with_order(order)
}

pub struct ProxyFixture {
    pub dir: TempDir,
    pub transport: Arc<MockTransport>,
    pub handler: RepositoryProxyHandler,
}

impl ProxyFixture {
    /// Managed repository accepting releases and snapshots.
    pub fn new(connectors: Vec<ProxyConnectorConfiguration>) -> Self {
        Self::with_repository(|_| {}, connectors)
    }

    pub fn with_repository(
        configure: impl FnOnce(&mut ManagedRepository),
        connectors: Vec<ProxyConnectorConfiguration>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut managed = ManagedRepository::new(MANAGED, dir.path().join("managed"));
        managed.snapshots = true;
        configure(&mut managed);
        std::fs::create_dir_all(&managed.location).unwrap();

        let registry = RepositoryRegistry::new(RepositoryConfiguration {
            managed_repositories: vec![managed],
            remote_repositories: vec![
                RemoteRepository::new(CENTRAL, "https://central.example.test/maven2"),
                RemoteRepository::new(MIRROR, "https://mirror.example.test/maven2"),
            ],
            proxy_connectors: connectors,
        })
        .unwrap();

        let transport = Arc::new(MockTransport::default());
        let handler = RepositoryProxyHandler::new(
            Arc::new(registry),
            transport.clone(),
            Arc::new(UrlFailureCache::new(100, Duration::from_secs(3600))),
            Arc::new(MetadataStore::new()),
        );

        Self {
            dir,
            transport,
            handler,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("managed")
    }

    pub fn local(&self, path: &str) -> PathBuf {
        self.root().join(path)
    }

    pub fn put_local(&self, path: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let file = self.local(path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, content).unwrap();
        file
    }
}

pub fn sha1_hex(content: &[u8]) -> String {
    hex::encode(Sha1::digest(content))
}

/// Whether any staging directory survived under `root`.
pub fn no_staging_left(root: &Path) -> bool {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .all(|e| !is_staging_name(&e.file_name().to_string_lossy()))
}

/// Create `relative` under `root` with its own path as content.
pub fn touch(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, relative.as_bytes()).unwrap();
    path
}
