//! Remote transports.
//!
//! A transport copies one remote file into a local destination. HTTP(S)
//! goes through reqwest with a streamed body; `file://` remotes are copied
//! from disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::models::repository::RemoteRepository;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The remote does not have the file.
    #[error("Not found on remote: {0}")]
    NotFound(String),

    #[error("Transfer from {url} failed: {reason}")]
    Failed { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

/// Fetch capability over some protocol.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Download `path` (relative to the remote root) into `destination`.
    async fn fetch(
        &self,
        remote: &RemoteRepository,
        path: &str,
        destination: &Path,
    ) -> Result<(), TransportError>;
}

/// Build full remote URL for a repository-relative path
pub fn build_remote_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

/// HTTP(S) transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::Failed {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    async fn stream_to_file(
        response: reqwest::Response,
        url: &str,
        destination: &Path,
    ) -> Result<u64, TransportError> {
        let mut file = fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::Failed {
                url: url.to_string(),
                reason: format!("Failed to read response body: {}", e),
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn fetch(
        &self,
        remote: &RemoteRepository,
        path: &str,
        destination: &Path,
    ) -> Result<(), TransportError> {
        let url = build_remote_url(&remote.url, path);
        tracing::debug!(remote = %remote.id, url = %url, "Fetching from remote");

        let mut request = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(remote.timeout_secs.max(1)));
        if let Some(username) = &remote.username {
            request = request.basic_auth(username, remote.password.as_ref());
        }

        let response = request.send().await.map_err(|e| TransportError::Failed {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(TransportError::NotFound(url));
        }
        if !status.is_success() {
            return Err(TransportError::Failed {
                url,
                reason: format!("remote returned status {}", status),
            });
        }

        match Self::stream_to_file(response, &url, destination).await {
            Ok(bytes) => {
                tracing::debug!(remote = %remote.id, url = %url, bytes, "Fetched from remote");
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(destination).await;
                Err(e)
            }
        }
    }
}

/// `file://` transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTransport;

impl FileTransport {
    fn source_path(remote: &RemoteRepository, path: &str) -> PathBuf {
        let base = remote
            .url
            .strip_prefix("file://")
            .unwrap_or(&remote.url);
        let mut source = PathBuf::from(base);
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != "." && *s != "..") {
            source.push(segment);
        }
        source
    }
}

#[async_trait]
impl RemoteTransport for FileTransport {
    async fn fetch(
        &self,
        remote: &RemoteRepository,
        path: &str,
        destination: &Path,
    ) -> Result<(), TransportError> {
        let source = Self::source_path(remote, path);
        match fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(TransportError::NotFound(source.display().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransportError::NotFound(source.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        fs::copy(&source, destination).await?;
        Ok(())
    }
}

/// Picks the transport by URL scheme.
pub struct DefaultTransport {
    http: HttpTransport,
    file: FileTransport,
}

impl DefaultTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        Ok(Self {
            http: HttpTransport::new(timeout, user_agent)?,
            file: FileTransport,
        })
    }
}

#[async_trait]
impl RemoteTransport for DefaultTransport {
    async fn fetch(
        &self,
        remote: &RemoteRepository,
        path: &str,
        destination: &Path,
    ) -> Result<(), TransportError> {
        let scheme = remote.url.split("://").next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "http" | "https" => self.http.fetch(remote, path, destination).await,
            "file" => self.file.fetch(remote, path, destination).await,
            other => Err(TransportError::Failed {
                url: remote.url.clone(),
                reason: format!("unsupported protocol '{}'", other),
            }),
        }
    }
}
