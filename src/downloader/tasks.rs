//! Task admission, dispatch and queries.

use super::UrlDownloader;
use super::pool::{Job, JobOutcome};
use crate::error::{Error, Result};
use crate::executor::destination_for;
use crate::types::{Event, Task, TaskId, TaskStats, TaskStatus};
use crate::validation::validate_urls;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::atomic::Ordering;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

impl UrlDownloader {
    /// Admit a new task for `urls` and start processing it in the background.
    ///
    /// The URLs are validated, a task with one pending item per URL is persisted, and the
    /// created task is returned before any download starts. Poll [`get_task`] or
    /// [`subscribe`] for progress.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once shutdown has started
    /// - [`Error::Validation`] if the URL list is rejected
    /// - [`Error::Store`] if the task could not be persisted
    ///
    /// [`get_task`]: UrlDownloader::get_task
    /// [`subscribe`]: UrlDownloader::subscribe
    pub async fn create_task(&self, urls: Vec<String>) -> Result<Task> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        validate_urls(&urls, &self.config.server.api)?;

        let id = TaskId::new();
        let task = Task::new(id, urls, |index, url| destination_for(id, index, url));
        self.store.create(task.clone()).await?;

        tracing::info!(task_id = %id, urls = task.urls.len(), "task created");
        self.emit_event(Event::TaskCreated {
            id,
            urls: task.urls.len(),
        });

        self.spawn_processing(id);
        Ok(task)
    }

    /// Current snapshot of a task
    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        Ok(self.store.get(id).await?)
    }

    /// Stored tasks, oldest first, optionally filtered by status
    pub async fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        let mut tasks = match status {
            Some(status) => self.store.list_by_status(status).await,
            None => self.store.list_all().await,
        };
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Task counts per status
    pub async fn stats(&self) -> TaskStats {
        self.store.stats().await
    }

    /// Number of tasks currently being dispatched
    pub async fn active_task_count(&self) -> usize {
        self.queue_state.active_tasks.lock().await.len()
    }

    /// Run a task to completion.
    ///
    /// Marks the task in-progress, then queues one job per unsettled item in URL order.
    /// At most `per_task_concurrency` items of this task are in flight at once (0 means
    /// no per-task cap). Submitting waits while the shared job queue is full. Returns the
    /// final snapshot once every item is terminal and the verdict is persisted.
    ///
    /// Cancelling `cancel` stops dispatching, aborts in-flight transfers and puts their
    /// items back to pending; the call then returns [`Error::Cancelled`]. A task that is
    /// already terminal is returned as is.
    pub async fn process_task(&self, id: TaskId, cancel: CancellationToken) -> Result<Task> {
        {
            let mut active = self.queue_state.active_tasks.lock().await;
            if active.contains_key(&id) {
                return Err(Error::AlreadyProcessing(id));
            }
            active.insert(id, cancel.clone());
        }

        let result = self.dispatch_items(id, &cancel).await;

        self.queue_state.active_tasks.lock().await.remove(&id);
        result
    }

    async fn dispatch_items(&self, id: TaskId, cancel: &CancellationToken) -> Result<Task> {
        let task = self.writer.start_task(id).await?;
        if task.status.is_terminal() {
            return Ok(task);
        }

        let unsettled = task.unsettled_items();
        let limit = match self.config.download.per_task_concurrency {
            0 => usize::MAX,
            n => n,
        };

        tracing::debug!(task_id = %id, items = unsettled.len(), limit, "dispatching task");

        let mut remaining = unsettled.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut first_error: Option<Error> = None;

        loop {
            while in_flight.len() < limit && !cancel.is_cancelled() && first_error.is_none() {
                let Some(index) = remaining.next() else {
                    break;
                };

                let (done, outcome) = oneshot::channel();
                let job = Job {
                    task_id: id,
                    index,
                    cancel: cancel.child_token(),
                    done,
                };

                let submitted = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    submitted = self.pool.submit(job) => submitted,
                };
                if let Err(e) = submitted {
                    first_error = Some(e);
                    break;
                }

                in_flight.push(async move { (index, outcome.await) });
            }

            let Some((index, outcome)) = in_flight.next().await else {
                break;
            };

            match outcome {
                Ok(JobOutcome::Finished(status)) => {
                    tracing::trace!(task_id = %id, index, ?status, "item settled");
                }
                Ok(JobOutcome::Interrupted) => {
                    tracing::debug!(task_id = %id, index, "item interrupted");
                }
                Ok(JobOutcome::Abandoned(e)) => {
                    tracing::error!(task_id = %id, index, error = %e, "item could not be processed");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    // Job dropped unstarted because the pool stopped
                    tracing::debug!(task_id = %id, index, "job dropped by stopped worker pool");
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let task = self.store.get(id).await?;
        if task.status.is_terminal() {
            Ok(task)
        } else {
            Err(Error::Cancelled)
        }
    }

    /// Process a task in the background, tied to the downloader's shutdown token
    pub(crate) fn spawn_processing(&self, id: TaskId) {
        let cancel = self.queue_state.shutdown.child_token();
        let downloader = self.clone();

        self.queue_state.processors.spawn(async move {
            match downloader.process_task(id, cancel).await {
                Ok(task) => {
                    tracing::debug!(task_id = %id, status = %task.status, "task processing finished");
                }
                Err(Error::Cancelled) | Err(Error::ShuttingDown) => {
                    tracing::info!(task_id = %id, "task processing stopped, unfinished items kept for resume");
                }
                Err(e) => {
                    tracing::error!(task_id = %id, error = %e, "task processing failed");
                }
            }
        });
    }
}
