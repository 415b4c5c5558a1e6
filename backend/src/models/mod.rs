//! Repository, artifact and metadata models.

pub mod artifact;
pub mod metadata;
pub mod proxy_connector;
pub mod repository;
