//! Single-writer funnel for task mutations.
//!
//! Every change to a stored task (dispatch, item start, item outcome, recovery reset) is
//! sent as a [`StateCommand`] over one ordered channel and applied by one background
//! task. Each command is a full read-modify-write against the store, so two updates for
//! the same task never interleave and the recomputed status always reflects every
//! outcome applied so far.

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::store::TaskStore;
use crate::types::{Event, ItemOutcome, ItemStatus, Task, TaskId};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Pending commands the writer buffers before senders wait
const COMMAND_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<Result<T>>;

/// A typed mutation applied by the writer task
pub(crate) enum StateCommand {
    /// Mark a task as dispatched
    StartTask { id: TaskId, reply: Reply<Task> },
    /// A worker picked up an item
    ItemStarted {
        id: TaskId,
        index: usize,
        reply: Reply<Task>,
    },
    /// A worker finished an attempt
    ItemFinished {
        id: TaskId,
        index: usize,
        outcome: ItemOutcome,
        reply: Reply<Task>,
    },
    /// Put crash-interrupted items back to pending; replies with the reset count
    ResetInterrupted {
        id: TaskId,
        reply: Reply<(Task, usize)>,
    },
}

/// Handle for sending commands to the writer task
#[derive(Clone)]
pub(crate) struct StateWriter {
    tx: mpsc::Sender<StateCommand>,
}

impl StateWriter {
    /// Spawn the writer task on `tracker`. It drains queued commands and exits once `stop`
    /// is cancelled.
    pub(crate) fn spawn(
        store: Arc<TaskStore>,
        event_tx: broadcast::Sender<Event>,
        metrics: Metrics,
        stop: CancellationToken,
        tracker: &TaskTracker,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let worker = WriterTask {
            store,
            event_tx,
            metrics,
        };
        tracker.spawn(worker.run(rx, stop));
        Self { tx }
    }

    /// Transition a task to in-progress. Terminal tasks are returned unchanged.
    pub(crate) async fn start_task(&self, id: TaskId) -> Result<Task> {
        self.request(|reply| StateCommand::StartTask { id, reply })
            .await
    }

    /// Mark item `index` in-progress and clear its error
    pub(crate) async fn item_started(&self, id: TaskId, index: usize) -> Result<Task> {
        self.request(|reply| StateCommand::ItemStarted { id, index, reply })
            .await
    }

    /// Record the outcome of an attempt and recompute the task status
    pub(crate) async fn item_finished(
        &self,
        id: TaskId,
        index: usize,
        outcome: ItemOutcome,
    ) -> Result<Task> {
        self.request(|reply| StateCommand::ItemFinished {
            id,
            index,
            outcome,
            reply,
        })
        .await
    }

    /// Reset every in-progress item of a task to pending
    pub(crate) async fn reset_interrupted(&self, id: TaskId) -> Result<(Task, usize)> {
        self.request(|reply| StateCommand::ResetInterrupted { id, reply })
            .await
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> StateCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| Error::ShuttingDown)?;
        response.await.map_err(|_| Error::ShuttingDown)?
    }
}

struct WriterTask {
    store: Arc<TaskStore>,
    event_tx: broadcast::Sender<Event>,
    metrics: Metrics,
}

impl WriterTask {
    async fn run(self, mut rx: mpsc::Receiver<StateCommand>, stop: CancellationToken) {
        tracing::debug!("state writer started");

        loop {
            let command = tokio::select! {
                biased;
                command = rx.recv() => command,
                _ = stop.cancelled() => None,
            };
            match command {
                Some(command) => self.apply(command).await,
                None => break,
            }
        }

        // Refuse new commands but apply whatever was already queued
        rx.close();
        while let Some(command) = rx.recv().await {
            self.apply(command).await;
        }

        tracing::debug!("state writer stopped");
    }

    async fn apply(&self, command: StateCommand) {
        match command {
            StateCommand::StartTask { id, reply } => {
                let _ = reply.send(self.start_task(id).await);
            }
            StateCommand::ItemStarted { id, index, reply } => {
                let _ = reply.send(self.item_started(id, index).await);
            }
            StateCommand::ItemFinished {
                id,
                index,
                outcome,
                reply,
            } => {
                let _ = reply.send(self.item_finished(id, index, outcome).await);
            }
            StateCommand::ResetInterrupted { id, reply } => {
                let _ = reply.send(self.reset_interrupted(id).await);
            }
        }
    }

    async fn start_task(&self, id: TaskId) -> Result<Task> {
        let mut task = self.store.get(id).await?;
        if task.status.is_terminal() {
            return Ok(task);
        }

        task.status = task.derive_status();
        let stored = self.store.update(task).await?;
        tracing::debug!(task_id = %id, status = %stored.status, "task dispatched");
        self.emit_terminal(&stored, false);
        Ok(stored)
    }

    async fn item_started(&self, id: TaskId, index: usize) -> Result<Task> {
        let mut task = self.store.get(id).await?;
        let item = task
            .items
            .get_mut(index)
            .ok_or(Error::InvalidItem { id, index })?;
        item.status = ItemStatus::InProgress;
        item.error.clear();

        task.status = task.derive_status();
        let stored = self.store.update(task).await?;
        self.emit(Event::ItemStarted { id, index });
        Ok(stored)
    }

    async fn item_finished(&self, id: TaskId, index: usize, outcome: ItemOutcome) -> Result<Task> {
        let mut task = self.store.get(id).await?;
        let was_terminal = task.status.is_terminal();
        let item = task
            .items
            .get_mut(index)
            .ok_or(Error::InvalidItem { id, index })?;

        let event = match outcome {
            ItemOutcome::Completed { bytes } => {
                item.status = ItemStatus::Completed;
                item.bytes_transferred = bytes;
                item.error.clear();
                Some(Event::ItemCompleted { id, index, bytes })
            }
            ItemOutcome::Failed { error, bytes } => {
                item.status = ItemStatus::Failed;
                item.bytes_transferred = bytes;
                item.error = error.clone();
                Some(Event::ItemFailed { id, index, error })
            }
            ItemOutcome::Interrupted { bytes } => {
                item.status = ItemStatus::Pending;
                item.bytes_transferred = bytes;
                item.error.clear();
                None
            }
        };

        task.status = task.derive_status();
        let stored = self.store.update(task).await?;

        if let Some(event) = event {
            self.emit(event);
        }
        self.emit_terminal(&stored, was_terminal);
        Ok(stored)
    }

    async fn reset_interrupted(&self, id: TaskId) -> Result<(Task, usize)> {
        let mut task = self.store.get(id).await?;

        let mut reset = 0;
        for item in task
            .items
            .iter_mut()
            .filter(|item| item.status == ItemStatus::InProgress)
        {
            item.status = ItemStatus::Pending;
            item.error.clear();
            reset += 1;
        }

        task.status = task.derive_status();
        let stored = self.store.update(task).await?;
        Ok((stored, reset))
    }

    // Emit the task verdict on the first transition into a terminal status
    fn emit_terminal(&self, task: &Task, was_terminal: bool) {
        if was_terminal || !task.status.is_terminal() {
            return;
        }

        let failed_items = task.count_items(ItemStatus::Failed);
        if failed_items == 0 {
            tracing::info!(task_id = %task.id, items = task.items.len(), "task completed");
            self.emit(Event::TaskCompleted { id: task.id });
        } else {
            tracing::warn!(task_id = %task.id, failed_items, items = task.items.len(), "task failed");
            self.emit(Event::TaskFailed {
                id: task.id,
                failed_items,
            });
        }
    }

    fn emit(&self, event: Event) {
        self.metrics.record_event(&event);
        // No subscribers is not an error
        let _ = self.event_tx.send(event);
    }
}
