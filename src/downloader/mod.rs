//! Core downloader implementation split into focused submodules.
//!
//! The `UrlDownloader` struct and its methods are organized by domain:
//! - [`tasks`] - Task admission, dispatch and queries
//! - [`pool`] - Fixed-size worker pool over a bounded job queue
//! - [`writer`] - Single-writer funnel for every task mutation
//! - [`recovery`] - Startup reconciliation of interrupted tasks
//! - [`lifecycle`] - Shutdown coordination

mod lifecycle;
mod pool;
mod recovery;
mod tasks;
mod writer;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{DownloadExecutor, HttpExecutor};
use crate::metrics::Metrics;
use crate::store::TaskStore;
use crate::types::{Event, TaskId};
use pool::{WorkerContext, WorkerPool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use writer::StateWriter;

/// Dispatch and shutdown state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Tasks currently being dispatched, with their cancellation tokens
    pub(crate) active_tasks:
        Arc<tokio::sync::Mutex<HashMap<TaskId, CancellationToken>>>,
    /// Flag to indicate whether new tasks are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Parent of every task's processing token
    pub(crate) shutdown: CancellationToken,
    /// Background `process_task` runs
    pub(crate) processors: TaskTracker,
    /// Worker pool tasks
    pub(crate) workers: TaskTracker,
    /// Stops the state writer once workers are done
    pub(crate) writer_stop: CancellationToken,
    /// State writer task
    pub(crate) writer_task: TaskTracker,
}

impl QueueState {
    fn new() -> Self {
        Self {
            active_tasks: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
            processors: TaskTracker::new(),
            workers: TaskTracker::new(),
            writer_stop: CancellationToken::new(),
            writer_task: TaskTracker::new(),
        }
    }
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct UrlDownloader {
    /// Task store (public for integration tests to inspect persisted state)
    pub store: Arc<TaskStore>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Funnel for task mutations
    pub(crate) writer: StateWriter,
    /// Job submission handle
    pub(crate) pool: WorkerPool,
    /// Dispatch and shutdown state
    pub(crate) queue_state: QueueState,
    /// Task and download counters
    pub(crate) metrics: Metrics,
}

impl UrlDownloader {
    /// Create a new UrlDownloader using the HTTP executor
    ///
    /// This initializes all core components:
    /// - Creates the download and task directories
    /// - Loads every persisted task (fails on a corrupt record)
    /// - Starts the state writer and the worker pool
    /// - Recovers unfinished tasks before returning, so recovery always precedes new admissions
    pub async fn new(config: Config) -> Result<Self> {
        let executor = HttpExecutor::from_config(&config.download)?;
        Self::with_executor(config, Arc::new(executor)).await
    }

    /// Create a UrlDownloader with a custom [`DownloadExecutor`]
    pub async fn with_executor(
        config: Config,
        executor: Arc<dyn DownloadExecutor>,
    ) -> Result<Self> {
        create_dir(&config.download.download_dir, "download").await?;
        create_dir(&config.persistence.task_dir, "task").await?;

        let store = Arc::new(TaskStore::open(&config.persistence.task_dir).await?);

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let queue_state = QueueState::new();
        let metrics = Metrics::new()?;

        let writer = StateWriter::spawn(
            store.clone(),
            event_tx.clone(),
            metrics.clone(),
            queue_state.writer_stop.clone(),
            &queue_state.writer_task,
        );

        let pool = WorkerPool::start(
            config.download.max_concurrent_downloads,
            config.download.queue_capacity,
            WorkerContext {
                store: store.clone(),
                writer: writer.clone(),
                executor,
                metrics: metrics.clone(),
                download_dir: config.download.download_dir.clone(),
            },
            queue_state.shutdown.clone(),
            &queue_state.workers,
        );

        let downloader = Self {
            store,
            event_tx,
            config: Arc::new(config),
            writer,
            pool,
            queue_state,
            metrics,
        };

        let recovered = downloader.recover_tasks().await;
        tracing::info!(
            recovered = recovered.len(),
            workers = downloader.pool.size(),
            "downloader started"
        );

        Ok(downloader)
    }

    /// Subscribe to downloader events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration the downloader was started with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Prometheus counters for this downloader
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Whether new tasks are being admitted
    pub fn is_accepting(&self) -> bool {
        self.queue_state
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of worker slots
    pub fn worker_count(&self) -> usize {
        self.pool.size()
    }

    /// Jobs waiting for a free worker
    pub fn queued_jobs(&self) -> usize {
        self.pool.queued()
    }

    /// Token cancelled when shutdown begins
    pub fn shutdown_token(&self) -> CancellationToken {
        self.queue_state.shutdown.clone()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        self.metrics.record_event(&event);
        // No subscribers is not an error
        let _ = self.event_tx.send(event);
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}

async fn create_dir(path: &Path, what: &str) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to create {what} directory '{}': {e}",
                path.display()
            ),
        ))
    })
}
