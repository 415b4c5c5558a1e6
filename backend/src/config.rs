//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::services::scheduler_service::SchedulerConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON file with managed/remote repositories and proxy connectors
    pub repositories_config: PathBuf,

    /// How long a failed remote fetch is remembered
    pub failure_cache_ttl_secs: u64,

    /// Maximum number of remembered failures
    pub failure_cache_capacity: usize,

    /// Client-wide HTTP timeout; remotes may set a shorter one
    pub http_timeout_secs: u64,

    /// User-Agent sent to remotes
    pub http_user_agent: String,

    /// Pending scans before new requests are refused
    pub scan_queue_capacity: usize,

    /// Concurrent repository scans
    pub scan_workers: usize,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value '{}'", name, value))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            repositories_config: PathBuf::from(
                env::var("REPOSITORIES_CONFIG").unwrap_or_else(|_| "./repositories.json".into()),
            ),
            failure_cache_ttl_secs: parse_var("FAILURE_CACHE_TTL_SECS", 3600)?,
            failure_cache_capacity: parse_var("FAILURE_CACHE_CAPACITY", 10_000)?,
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", 60)?,
            http_user_agent: env::var("HTTP_USER_AGENT")
                .unwrap_or_else(|_| format!("maven-proxy/{}", env!("CARGO_PKG_VERSION"))),
            scan_queue_capacity: parse_var("SCAN_QUEUE_CAPACITY", 32)?,
            scan_workers: parse_var("SCAN_WORKERS", 2)?,
        })
    }

    pub fn failure_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            queue_capacity: self.scan_queue_capacity,
            workers: self.scan_workers,
        }
    }
}
