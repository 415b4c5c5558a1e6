//! CLI modules for Maven Proxy.

pub mod proxy;
pub mod proxy_runner;

pub use proxy::{ProxyCli, ProxyCommand};
pub use proxy_runner::run as run_proxy;
