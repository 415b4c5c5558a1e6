//! Proxying, metadata, purge and scheduling services.

pub mod connector_service;
pub mod event_bus;
pub mod failure_cache;
pub mod metadata_service;
pub mod policies;
pub mod proxy_service;
pub mod purge_service;
pub mod repository_scanner;
pub mod repository_service;
pub mod scheduler_service;
pub mod transport;
