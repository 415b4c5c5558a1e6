//! Maven Proxy - Main Entry Point

use clap::Parser;

use maven_proxy::{
    cli::{run_proxy, ProxyCli},
    config::Config,
    error::Result,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    telemetry::init_tracing();

    let cli = ProxyCli::parse();
    let config = Config::from_env()?;
    tracing::debug!(?config, "Loaded configuration");

    run_proxy(cli, config).await
}
