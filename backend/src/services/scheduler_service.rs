//! Repository scan scheduler.
//!
//! Scan requests go onto a bounded queue drained by a fixed pool of workers.
//! A repository is never queued or scanned twice at the same time. Each scan
//! runs the retention purge over the repository's artifacts; incremental
//! scans only look at files changed since the last completed scan. Managed
//! repositories are also scanned on their refresh cron expression.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::services::metadata_service::MetadataStore;
use crate::services::purge_service::{ContentConsumer, RepositoryPurge};
use crate::services::repository_scanner::{RepositoryScanner, ScanStatistics};
use crate::services::repository_service::RepositoryRegistry;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            workers: 2,
        }
    }
}

#[derive(Debug, Clone)]
struct ScanRequest {
    repository_id: String,
    full: bool,
}

struct SchedulerState {
    registry: Arc<RepositoryRegistry>,
    metadata: Arc<MetadataStore>,
    queue: Mutex<Option<mpsc::Sender<ScanRequest>>>,
    in_progress: Mutex<HashSet<String>>,
    last_scans: Mutex<HashMap<String, SystemTime>>,
    statistics: Mutex<HashMap<String, ScanStatistics>>,
    cancel: CancellationToken,
}

impl SchedulerState {
    fn enqueue(&self, repository_id: &str, full: bool) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.registry.managed_repository(repository_id).is_none() {
            tracing::warn!(repository = repository_id, "Scan requested for unknown repository");
            return false;
        }
        {
            let mut in_progress = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
            if !in_progress.insert(repository_id.to_string()) {
                tracing::debug!(repository = repository_id, "Scan already queued or running");
                return false;
            }
        }

        let sent = {
            let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            match queue.as_ref() {
                Some(sender) => sender
                    .try_send(ScanRequest {
                        repository_id: repository_id.to_string(),
                        full,
                    })
                    .map_err(|e| e.to_string()),
                None => Err("scheduler is shut down".to_string()),
            }
        };

        match sent {
            Ok(()) => {
                tracing::debug!(repository = repository_id, full, "Queued repository scan");
                true
            }
            Err(reason) => {
                tracing::warn!(repository = repository_id, reason = %reason, "Unable to queue repository scan");
                self.finish(repository_id);
                false
            }
        }
    }

    fn finish(&self, repository_id: &str) {
        self.in_progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(repository_id);
    }

    async fn run(&self, request: ScanRequest) {
        let id = request.repository_id.clone();
        let Some(repository) = self.registry.managed_repository(&id) else {
            tracing::warn!(repository = %id, "Repository removed before its scan ran");
            self.finish(&id);
            return;
        };

        let since = if request.full {
            None
        } else {
            self.last_scan(&id)
        };
        let started = SystemTime::now();
        let repository = Arc::new(repository);
        let purge: Arc<dyn ContentConsumer> = Arc::new(RepositoryPurge::new(repository.clone(), self.metadata.clone()));
        let scanner = RepositoryScanner::new(repository, vec![purge]);
        let cancel = self.cancel.clone();

        match tokio::task::spawn_blocking(move || scanner.scan(since, &cancel)).await {
            Ok(stats) => {
                if !stats.cancelled {
                    self.last_scans
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(id.clone(), started);
                }
                self.statistics
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(id.clone(), stats);
            }
            Err(e) => tracing::error!(repository = %id, error = %e, "Repository scan task failed"),
        }
        self.finish(&id);
    }

    fn last_scan(&self, repository_id: &str) -> Option<SystemTime> {
        self.last_scans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(repository_id)
            .copied()
    }
}

/// Queue of repository scans with a worker pool and cron triggers.
pub struct RepositoryTaskScheduler {
    state: Arc<SchedulerState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RepositoryTaskScheduler {
    /// Spawn the worker pool. Must be called within a tokio runtime.
    pub fn start(registry: Arc<RepositoryRegistry>, metadata: Arc<MetadataStore>, config: SchedulerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let state = Arc::new(SchedulerState {
            registry,
            metadata,
            queue: Mutex::new(Some(sender)),
            in_progress: Mutex::new(HashSet::new()),
            last_scans: Mutex::new(HashMap::new()),
            statistics: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        });

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = config.workers.max(1);
        let mut tasks = Vec::with_capacity(workers);
        for worker in 0..workers {
            let state = state.clone();
            let receiver = receiver.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    let request = tokio::select! {
                        _ = state.cancel.cancelled() => break,
                        request = async { receiver.lock().await.recv().await } => request,
                    };
                    let Some(request) = request else {
                        break;
                    };
                    tracing::debug!(worker, repository = %request.repository_id, "Worker picked up scan");
                    state.run(request).await;
                }
                tracing::debug!(worker, "Scan worker stopped");
            }));
        }

        tracing::info!(
            workers,
            queue_capacity = config.queue_capacity.max(1),
            "Repository scan scheduler started"
        );
        Self {
            state,
            tasks: Mutex::new(tasks),
        }
    }

    /// Queue a scan. Returns false when the repository is unknown, already
    /// queued or running, or the queue is full.
    pub fn scan_repository(&self, repository_id: &str, full_scan: bool) -> bool {
        self.state.enqueue(repository_id, full_scan)
    }

    pub fn is_scanning(&self, repository_id: &str) -> bool {
        self.state
            .in_progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(repository_id)
    }

    /// Start time of the last completed scan.
    pub fn last_scan(&self, repository_id: &str) -> Option<SystemTime> {
        self.state.last_scan(repository_id)
    }

    pub fn statistics(&self, repository_id: &str) -> Option<ScanStatistics> {
        self.state
            .statistics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(repository_id)
            .cloned()
    }

    /// Trigger incremental scans on each managed repository's refresh cron
    /// expression. The expression is re-read before every wait; a task ends
    /// when its repository is removed.
    pub fn schedule_cron_scans(&self) {
        let repositories = self.state.registry.managed_repositories();
        let count = repositories.len();
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for repository in repositories {
            let state = self.state.clone();
            let id = repository.id;
            tasks.push(tokio::spawn(async move {
                loop {
                    let Some(repository) = state.registry.managed_repository(&id) else {
                        break;
                    };
                    let now = Utc::now();
                    let Some(next) = compute_next_run(&repository.refresh_cron_expression, now) else {
                        break;
                    };
                    let wait = (next - now).to_std().unwrap_or_default();
                    tokio::select! {
                        _ = state.cancel.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                    tracing::debug!(repository = %id, "Cron scan due");
                    state.enqueue(&id, false);
                }
            }));
        }
        tracing::info!(repositories = count, "Cron scans scheduled");
    }

    /// Cancel running scans, stop accepting requests and wait for every
    /// worker and cron task to end.
    pub async fn shutdown(&self) {
        self.state.cancel.cancel();
        self.state.queue.lock().unwrap_or_else(|e| e.into_inner()).take();
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Scheduler task ended abnormally: {}", e);
            }
        }
        tracing::info!("Repository scan scheduler stopped");
    }
}

/// Quartz-style `?` reads as `*`, and a unix-style expression without a
/// seconds field fires at second zero.
fn normalize_cron(cron_expr: &str) -> String {
    let mut fields: Vec<&str> = cron_expr
        .split_whitespace()
        .map(|field| if field == "?" { "*" } else { field })
        .collect();
    if fields.len() == 5 {
        fields.insert(0, "0");
    }
    fields.join(" ")
}

/// Next fire time of a cron expression after `after`.
fn compute_next_run(cron_expr: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match Schedule::from_str(&normalize_cron(cron_expr)) {
        Ok(schedule) => schedule.after(&after).next(),
        Err(e) => {
            tracing::warn!(
                "Invalid cron expression '{}': {}. Falling back to 24h from now.",
                cron_expr,
                e
            );
            Some(after + chrono::Duration::hours(24))
        }
    }
}
