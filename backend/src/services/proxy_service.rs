//! Proxy handler for managed repositories.
//!
//! Resolves a requested path against the managed repository's connectors,
//! applies download policies, transfers from remotes through a private
//! staging directory and commits files into local storage only once they are
//! complete and accepted.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::formats::{checksum_reference, get_layout, is_metadata_path, normalize_path, LayoutError};
use crate::models::repository::LayoutKind;
use crate::services::connector_service::{ConnectorResolver, ProxyConnector};
use crate::services::failure_cache::UrlFailureCache;
use crate::services::metadata_service::{proxied_metadata_path, MetadataError, MetadataStore};
use crate::services::policies::{ErrorDisposition, PolicyViolation, RequestKind};
use crate::services::repository_service::RepositoryRegistry;
use crate::services::transport::{RemoteTransport, TransportError};
use crate::storage::checksum::{side_file, ChecksumAlgorithm};
use crate::storage::content::ManagedRepositoryContent;
use crate::storage::filesystem::StagingDir;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Unknown managed repository '{0}'")]
    UnknownRepository(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("Transfer from '{remote}' failed: {source}")]
    Transport {
        remote: String,
        #[source]
        source: TransportError,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// A connector error recorded under the `queue` propagation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorFailure {
    pub remote_id: String,
    pub message: String,
}

/// Result of a proxied fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The file is in local storage at this path.
    Found(PathBuf),
    /// No connector produced the file; queued connector errors are listed.
    NotFound { failures: Vec<ConnectorFailure> },
    /// Every connector (or the repository itself) refused the request.
    Rejected(String),
}

impl FetchOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            FetchOutcome::Found(path) => Some(path),
            _ => None,
        }
    }
}

/// Why a single transfer did not produce a file.
enum TransferFailure {
    NotFound(TransportError),
    Failed(TransportError),
}

/// Tally of one pass over the connectors. Only policy refusals count as
/// rejections; cached failures end up as not found.
#[derive(Default)]
struct Attempts {
    rejected: usize,
    last_rejection: Option<String>,
    failures: Vec<ConnectorFailure>,
}

/// Fetches artifacts, checksums and metadata for managed repositories.
pub struct RepositoryProxyHandler {
    registry: Arc<RepositoryRegistry>,
    connectors: ConnectorResolver,
    transport: Arc<dyn RemoteTransport>,
    failures: Arc<UrlFailureCache>,
    metadata: Arc<MetadataStore>,
}

impl RepositoryProxyHandler {
    pub fn new(
        registry: Arc<RepositoryRegistry>,
        transport: Arc<dyn RemoteTransport>,
        failures: Arc<UrlFailureCache>,
        metadata: Arc<MetadataStore>,
    ) -> Self {
        let connectors = ConnectorResolver::new(registry.watch());
        Self {
            registry,
            connectors,
            transport,
            failures,
            metadata,
        }
    }

    pub fn failure_cache(&self) -> &UrlFailureCache {
        &self.failures
    }

    pub fn has_proxies(&self, managed_id: &str) -> bool {
        self.connectors.has_connectors(managed_id)
    }

    fn content(&self, managed_id: &str) -> Result<ManagedRepositoryContent, ProxyError> {
        let repository = self
            .registry
            .managed_repository(managed_id)
            .ok_or_else(|| ProxyError::UnknownRepository(managed_id.to_string()))?;
        Ok(ManagedRepositoryContent::new(Arc::new(repository)))
    }

    /// Fetch any repository path: metadata, checksum side-file or artifact.
    pub async fn fetch(&self, managed_id: &str, path: &str) -> Result<FetchOutcome, ProxyError> {
        let path = normalize_path(path);

        if let Some(reference_path) = checksum_reference(&path) {
            let outcome = if is_metadata_path(reference_path) {
                self.fetch_metadata(managed_id, reference_path).await?
            } else {
                self.fetch_artifact(managed_id, reference_path).await?
            };
            return Ok(match outcome {
                FetchOutcome::Found(reference) => {
                    let extension = &path[reference_path.len() + 1..];
                    let side = side_file(&reference, extension);
                    if side.exists() {
                        FetchOutcome::Found(side)
                    } else {
                        FetchOutcome::NotFound { failures: Vec::new() }
                    }
                }
                other => other,
            });
        }

        if is_metadata_path(&path) {
            self.fetch_metadata(managed_id, &path).await
        } else {
            self.fetch_artifact(managed_id, &path).await
        }
    }

    /// Fetch an artifact file through the repository's connectors.
    pub async fn fetch_artifact(&self, managed_id: &str, path: &str) -> Result<FetchOutcome, ProxyError> {
        let content = self.content(managed_id)?;
        let path = normalize_path(path);
        let reference = content.to_artifact_reference(&path)?;

        let snapshot = reference.is_snapshot();
        let repository = content.repository();
        if snapshot && !repository.snapshots {
            return Ok(FetchOutcome::Rejected(format!(
                "repository '{}' does not accept snapshots",
                managed_id
            )));
        }
        if !snapshot && !repository.releases {
            return Ok(FetchOutcome::Rejected(format!(
                "repository '{}' does not accept releases",
                managed_id
            )));
        }

        let local = content.resolve(&path);
        let kind = if snapshot {
            RequestKind::Snapshot
        } else {
            RequestKind::Release
        };
        let connectors = self.connectors.connectors_for(managed_id);
        if connectors.is_empty() {
            tracing::debug!(repository = managed_id, path = %path, "No proxy connectors");
            return Ok(not_found_or_local(&local, Vec::new()));
        }

        let mut attempts = Attempts::default();
        for connector in &connectors {
            if !connector.is_path_allowed(&path) {
                tracing::debug!(
                    remote = connector.target_id(),
                    path = %path,
                    "Path excluded by connector black/white list"
                );
                continue;
            }

            let remote_path = get_layout(connector.target.layout).to_path(&reference);
            let key = UrlFailureCache::key(connector.target_id(), &remote_path);

            if let Err(violation) = self.check_before_download(connector, kind, &local, &key) {
                if local.exists() {
                    tracing::debug!(
                        remote = connector.target_id(),
                        reason = %violation,
                        "Download skipped, serving local copy"
                    );
                    return Ok(FetchOutcome::Found(local));
                }
                attempts.reject(connector, violation);
                continue;
            }

            match self.transfer(connector, &remote_path, &local).await? {
                Ok(()) => {
                    self.failures.remove(&key);
                    tracing::info!(
                        "Fetched {} from {} into repository {}",
                        path,
                        connector.target_id(),
                        managed_id
                    );
                    return Ok(FetchOutcome::Found(local));
                }
                Err(failure) => {
                    self.failures.cache_failure(&key);
                    self.handle_failure(connector, failure, local.exists(), &mut attempts)?;
                }
            }
        }

        Ok(attempts.finish(&local, connectors.len()))
    }

    /// Fetch `maven-metadata.xml`: download each remote's copy as
    /// `maven-metadata-<remoteId>.xml`, then merge them into the local file.
    pub async fn fetch_metadata(&self, managed_id: &str, path: &str) -> Result<FetchOutcome, ProxyError> {
        let content = self.content(managed_id)?;
        if !content.layout().supports_metadata() {
            return Ok(FetchOutcome::Rejected(format!(
                "repository '{}' uses the {} layout which has no metadata",
                managed_id,
                content.layout().id()
            )));
        }

        let path = normalize_path(path);
        let local = content.resolve(&path);
        let Some(dir) = local.parent().map(Path::to_path_buf) else {
            return Err(LayoutError::invalid(&path, "metadata path has no directory").into());
        };

        let connectors = self.connectors.connectors_for(managed_id);
        let mut attempts = Attempts::default();
        let mut proxied = Vec::new();

        for connector in &connectors {
            if connector.target.layout == LayoutKind::Legacy || !connector.is_path_allowed(&path) {
                continue;
            }

            let copy = proxied_metadata_path(&dir, connector.target_id());
            let key = UrlFailureCache::key(connector.target_id(), &path);

            if let Err(violation) = self.check_before_download(connector, RequestKind::Metadata, &copy, &key) {
                tracing::debug!(remote = connector.target_id(), reason = %violation, "Metadata download skipped");
                if copy.exists() {
                    proxied.push(copy);
                } else {
                    attempts.reject(connector, violation);
                }
                continue;
            }

            match self.transfer(connector, &path, &copy).await? {
                Ok(()) => {
                    self.failures.remove(&key);
                    proxied.push(copy);
                }
                Err(failure) => {
                    self.failures.cache_failure(&key);
                    let exists = copy.exists();
                    self.handle_failure(connector, failure, exists, &mut attempts)?;
                    if exists {
                        proxied.push(copy);
                    }
                }
            }
        }

        let store = self.metadata.clone();
        let target = local.clone();
        let merged = tokio::task::spawn_blocking(move || store.merge_proxied(&target, &proxied))
            .await
            .map_err(io::Error::other)??;
        if merged {
            tracing::info!(repository = managed_id, path = %path, "Updated merged metadata");
        }

        Ok(attempts.finish(&local, connectors.len()))
    }

    fn check_before_download(
        &self,
        connector: &ProxyConnector,
        kind: RequestKind,
        local: &Path,
        key: &str,
    ) -> Result<(), PolicyViolation> {
        connector.policies.check_update(kind, local)?;
        connector.policies.cache_failures.check(&self.failures, key)
    }

    /// Apply the propagation policies to a failed transfer. Returns the error
    /// when it must abort the fetch.
    fn handle_failure(
        &self,
        connector: &ProxyConnector,
        failure: TransferFailure,
        local_exists: bool,
        attempts: &mut Attempts,
    ) -> Result<(), ProxyError> {
        let error = match failure {
            TransferFailure::NotFound(e) => {
                tracing::debug!(remote = connector.target_id(), error = %e, "Not found on remote");
                return Ok(());
            }
            TransferFailure::Failed(e) => e,
        };

        match connector.policies.error_disposition(local_exists) {
            ErrorDisposition::Propagate => {
                tracing::warn!(remote = connector.target_id(), error = %error, "Transfer failed, aborting fetch");
                Err(ProxyError::Transport {
                    remote: connector.target_id().to_string(),
                    source: error,
                })
            }
            ErrorDisposition::Queue => {
                tracing::warn!(remote = connector.target_id(), error = %error, "Transfer failed, trying next connector");
                attempts.failures.push(ConnectorFailure {
                    remote_id: connector.target_id().to_string(),
                    message: error.to_string(),
                });
                Ok(())
            }
            ErrorDisposition::Ignore => {
                tracing::debug!(remote = connector.target_id(), error = %error, "Transfer failed, ignored");
                Ok(())
            }
        }
    }

    /// Download `remote_path` plus its remote checksum side-files into a
    /// staging directory beside `local`, apply the checksum policy and commit.
    ///
    /// The outer `Result` is a local I/O failure; the inner one is the
    /// connector's verdict.
    async fn transfer(
        &self,
        connector: &ProxyConnector,
        remote_path: &str,
        local: &Path,
    ) -> Result<Result<(), TransferFailure>, ProxyError> {
        let filename = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LayoutError::invalid(remote_path, "path has no filename"))?;

        let staging = StagingDir::create(local)?;
        let staged = staging.file(&filename);

        if let Err(e) = self.transport.fetch(&connector.target, remote_path, &staged).await {
            return Ok(Err(if e.is_not_found() {
                TransferFailure::NotFound(e)
            } else {
                TransferFailure::Failed(e)
            }));
        }

        for algorithm in ChecksumAlgorithm::PROXY {
            let remote_side = format!("{}.{}", remote_path, algorithm.extension());
            let staged_side = side_file(&staged, algorithm.extension());
            match self.transport.fetch(&connector.target, &remote_side, &staged_side).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::debug!(remote = connector.target_id(), error = %e, "Unable to fetch checksum"),
            }
        }

        let policy = connector.policies.checksum;
        let target = local.to_path_buf();
        let url = format!("{}:{}", connector.target_id(), remote_path);
        let verdict = tokio::task::spawn_blocking(move || -> io::Result<Result<(), TransferFailure>> {
            if let Err(violation) = policy.apply(&staged) {
                return Ok(Err(TransferFailure::Failed(TransportError::Failed {
                    url,
                    reason: violation.to_string(),
                })));
            }

            for algorithm in ChecksumAlgorithm::PROXY {
                let staged_side = side_file(&staged, algorithm.extension());
                if staged_side.exists() {
                    staging.commit(&staged_side, &side_file(&target, algorithm.extension()))?;
                }
            }
            staging.commit(&staged, &target)?;
            Ok(Ok(()))
        })
        .await
        .map_err(io::Error::other)??;
        Ok(verdict)
    }
}

impl Attempts {
    fn reject(&mut self, connector: &ProxyConnector, violation: PolicyViolation) {
        if violation.is_cached_failure() {
            // Counts as not found on that remote.
            tracing::debug!(remote = connector.target_id(), reason = %violation, "Skipping remote after cached failure");
            return;
        }
        tracing::debug!(remote = connector.target_id(), reason = %violation, "Connector rejected request");
        self.rejected += 1;
        self.last_rejection = Some(violation.to_string());
    }

    fn finish(self, local: &Path, connector_count: usize) -> FetchOutcome {
        if local.exists() {
            return FetchOutcome::Found(local.to_path_buf());
        }
        if connector_count > 0 && self.rejected == connector_count {
            return FetchOutcome::Rejected(
                self.last_rejection
                    .unwrap_or_else(|| "rejected by download policy".to_string()),
            );
        }
        FetchOutcome::NotFound {
            failures: self.failures,
        }
    }
}

fn not_found_or_local(local: &Path, failures: Vec<ConnectorFailure>) -> FetchOutcome {
    if local.exists() {
        FetchOutcome::Found(local.to_path_buf())
    } else {
        FetchOutcome::NotFound { failures }
    }
}
