//! Application error types and result alias.

use thiserror::Error;

use crate::formats::LayoutError;
use crate::services::metadata_service::MetadataError;
use crate::services::proxy_service::ProxyError;
use crate::services::purge_service::PurgeError;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not found error
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict error (e.g., duplicate repository id)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Path could not be mapped to an artifact coordinate
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Proxy fetch failed
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// Purge of an artifact failed
    #[error(transparent)]
    Purge(#[from] PurgeError),

    /// Metadata read or write failed
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
