//! Fixed-size worker pool consuming item jobs from a bounded queue.

use super::writer::StateWriter;
use crate::error::{DownloadError, Error, Result};
use crate::executor::{DownloadExecutor, stored_size};
use crate::metrics::Metrics;
use crate::store::TaskStore;
use crate::types::{ItemOutcome, ItemStatus, TaskId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// One item attempt: `(task, index)` plus the dispatcher's cancellation and reply channel
pub(crate) struct Job {
    pub(crate) task_id: TaskId,
    pub(crate) index: usize,
    pub(crate) cancel: CancellationToken,
    pub(crate) done: oneshot::Sender<JobOutcome>,
}

/// What a worker reports back to the dispatcher
#[derive(Debug)]
pub(crate) enum JobOutcome {
    /// Item reached a terminal status
    Finished(ItemStatus),
    /// Attempt was cancelled; the item is pending again
    Interrupted,
    /// The job could not be run or its outcome could not be recorded
    Abandoned(Error),
}

/// Everything a worker needs to run a job
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) store: Arc<TaskStore>,
    pub(crate) writer: StateWriter,
    pub(crate) executor: Arc<dyn DownloadExecutor>,
    pub(crate) metrics: Metrics,
    pub(crate) download_dir: PathBuf,
}

/// Submission handle for the worker pool
#[derive(Clone)]
pub(crate) struct WorkerPool {
    tx: mpsc::Sender<Job>,
    size: usize,
}

impl WorkerPool {
    /// Start `size` workers on `tracker`, fed by a queue holding up to `capacity` jobs.
    ///
    /// Workers stop pulling jobs once `shutdown` is cancelled; a job already running is
    /// finished (its own token is a child of `shutdown`, so the transfer aborts promptly).
    pub(crate) fn start(
        size: usize,
        capacity: usize,
        context: WorkerContext,
        shutdown: CancellationToken,
        tracker: &TaskTracker,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..size {
            tracker.spawn(run_worker(
                worker_id,
                rx.clone(),
                context.clone(),
                shutdown.clone(),
            ));
        }

        tracing::debug!(workers = size, queue_capacity = capacity, "worker pool started");
        Self { tx, size }
    }

    /// Queue a job, waiting while the queue is full
    pub(crate) async fn submit(&self, job: Job) -> Result<()> {
        self.tx.send(job).await.map_err(|_| Error::ShuttingDown)
    }

    /// Number of workers
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently waiting in the queue
    pub(crate) fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    context: WorkerContext,
    shutdown: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                job = rx.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        let outcome = run_job(&context, &job).await;
        tracing::trace!(worker_id, task_id = %job.task_id, index = job.index, ?outcome, "job finished");
        // Dispatcher may have gone away; the store already has the result
        let _ = job.done.send(outcome);
    }

    tracing::debug!(worker_id, "worker stopped");
}

async fn run_job(context: &WorkerContext, job: &Job) -> JobOutcome {
    if job.cancel.is_cancelled() {
        return JobOutcome::Interrupted;
    }

    let task = match context.store.get(job.task_id).await {
        Ok(task) => task,
        Err(e) => return JobOutcome::Abandoned(e.into()),
    };
    let Some(item) = task.items.get(job.index) else {
        return JobOutcome::Abandoned(Error::InvalidItem {
            id: job.task_id,
            index: job.index,
        });
    };
    if item.status.is_terminal() {
        return JobOutcome::Finished(item.status);
    }

    let url = item.url.clone();
    let destination = context.download_dir.join(&item.destination);

    if let Err(e) = context.writer.item_started(job.task_id, job.index).await {
        return JobOutcome::Abandoned(e);
    }

    tracing::debug!(task_id = %job.task_id, index = job.index, url = %url, "download started");

    let before = stored_size(&destination).await;
    let started = Instant::now();
    context.metrics.download_attempted();

    let result = context
        .executor
        .download(&url, &destination, &job.cancel)
        .await;

    let after = match &result {
        Ok(done) => done.bytes_transferred,
        Err(_) => stored_size(&destination).await,
    };
    // A restarted transfer rewrote the file from zero
    let written = match &result {
        Ok(done) if !done.resumed => after,
        _ => after.saturating_sub(before),
    };
    context.metrics.download_finished(started.elapsed(), written);

    let outcome = match result {
        Ok(done) => {
            tracing::info!(
                task_id = %job.task_id,
                index = job.index,
                bytes = done.bytes_transferred,
                resumed = done.resumed,
                "download completed"
            );
            ItemOutcome::Completed {
                bytes: done.bytes_transferred,
            }
        }
        Err(DownloadError::Cancelled { .. }) => {
            tracing::info!(task_id = %job.task_id, index = job.index, bytes = after, "download interrupted");
            ItemOutcome::Interrupted { bytes: after }
        }
        Err(e) => {
            tracing::warn!(task_id = %job.task_id, index = job.index, error = %e, "download failed");
            ItemOutcome::Failed {
                error: e.to_string(),
                bytes: after,
            }
        }
    };

    let interrupted = matches!(outcome, ItemOutcome::Interrupted { .. });
    match context
        .writer
        .item_finished(job.task_id, job.index, outcome)
        .await
    {
        Ok(_) if interrupted => JobOutcome::Interrupted,
        Ok(task) => JobOutcome::Finished(task.items[job.index].status),
        Err(e) => JobOutcome::Abandoned(e),
    }
}
