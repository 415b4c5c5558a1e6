//! CLI command runner.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::proxy::{error, output, ProxyCli, ProxyCommand};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::services::failure_cache::UrlFailureCache;
use crate::services::metadata_service::MetadataStore;
use crate::services::proxy_service::{FetchOutcome, RepositoryProxyHandler};
use crate::services::purge_service::{ContentConsumer, RepositoryPurge};
use crate::services::repository_scanner::RepositoryScanner;
use crate::services::repository_service::RepositoryRegistry;
use crate::services::scheduler_service::RepositoryTaskScheduler;
use crate::services::transport::DefaultTransport;

/// Run a CLI command
pub async fn run(cli: ProxyCli, mut config: Config) -> Result<()> {
    if let Some(path) = &cli.config {
        config.repositories_config = path.clone();
    }
    let registry = Arc::new(RepositoryRegistry::load(&config.repositories_config)?);

    match cli.command {
        ProxyCommand::Fetch { repository, path } => {
            run_fetch(&cli.format, &config, registry, &repository, &path).await
        }
        ProxyCommand::Purge { repository } => run_purge(&cli.format, registry, &repository).await,
        ProxyCommand::Run { scan_now } => run_scheduler(&cli.format, &config, registry, scan_now).await,
    }
}

async fn run_fetch(
    format: &str,
    config: &Config,
    registry: Arc<RepositoryRegistry>,
    repository: &str,
    path: &str,
) -> Result<()> {
    let transport = DefaultTransport::new(config.http_timeout(), &config.http_user_agent)
        .map_err(|e| AppError::Config(e.to_string()))?;
    let handler = RepositoryProxyHandler::new(
        registry,
        Arc::new(transport),
        Arc::new(UrlFailureCache::new(
            config.failure_cache_capacity,
            config.failure_cache_ttl(),
        )),
        Arc::new(MetadataStore::new()),
    );
    if !handler.has_proxies(repository) {
        tracing::info!(repository, "No proxy connectors configured, serving local content only");
    }

    match handler.fetch(repository, path).await? {
        FetchOutcome::Found(file) => {
            output(
                format,
                &file.display().to_string(),
                Some(serde_json::json!({
                    "status": "found",
                    "repository": repository,
                    "path": path,
                    "file": file.display().to_string(),
                })),
            );
            Ok(())
        }
        FetchOutcome::NotFound { failures } => {
            for failure in &failures {
                error(format, &format!("{}: {}", failure.remote_id, failure.message));
            }
            Err(AppError::NotFound(format!("{} in {}", path, repository)))
        }
        FetchOutcome::Rejected(reason) => {
            error(format, &reason);
            Err(AppError::Validation(format!("{} rejected: {}", path, reason)))
        }
    }
}

async fn run_purge(format: &str, registry: Arc<RepositoryRegistry>, repository: &str) -> Result<()> {
    let managed = registry
        .managed_repository(repository)
        .ok_or_else(|| AppError::NotFound(format!("managed repository '{}'", repository)))?;
    let managed = Arc::new(managed);

    let purge = Arc::new(RepositoryPurge::new(managed.clone(), Arc::new(MetadataStore::new())));
    let scanner = RepositoryScanner::new(managed, vec![purge.clone() as Arc<dyn ContentConsumer>]);

    let stats = tokio::task::spawn_blocking(move || scanner.scan(None, &CancellationToken::new()))
        .await
        .map_err(|e| AppError::Internal(format!("purge task failed: {}", e)))?;
    let report = purge.report();

    output(
        format,
        &format!(
            "Scanned {} artifacts in {} ms: deleted {} files, removed {} versions, {} failures",
            stats.total_files,
            stats.duration_ms,
            report.deleted_files.len(),
            report.removed_versions.len(),
            report.failed_files.len() as u64 + stats.errors,
        ),
        Some(serde_json::json!({
            "repository": repository,
            "scanned": stats.total_files,
            "durationMs": stats.duration_ms,
            "deletedFiles": report.deleted_files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "removedVersions": report.removed_versions,
            "failedFiles": report.failed_files.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "errors": stats.errors,
        })),
    );
    Ok(())
}

async fn run_scheduler(
    format: &str,
    config: &Config,
    registry: Arc<RepositoryRegistry>,
    scan_now: bool,
) -> Result<()> {
    let scheduler = RepositoryTaskScheduler::start(
        registry.clone(),
        Arc::new(MetadataStore::new()),
        config.scheduler(),
    );
    scheduler.schedule_cron_scans();

    if scan_now {
        for repository in registry.managed_repositories() {
            if !scheduler.scan_repository(&repository.id, true) {
                error(format, &format!("Unable to queue scan of {}", repository.id));
            }
        }
    }

    output(format, "Scheduler running, press Ctrl-C to stop", None);
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    scheduler.shutdown().await;
    Ok(())
}
