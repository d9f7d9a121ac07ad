//! Startup reconciliation of tasks left unfinished by a previous process.

use super::UrlDownloader;
use crate::types::{Event, TaskId, TaskStatus};

impl UrlDownloader {
    /// Resume every pending or in-progress task.
    ///
    /// Items still marked in-progress were cut off mid-transfer; they are reset to pending
    /// with their error cleared, keeping the partial file for the executor to resume.
    /// Each task is then dispatched in the background, oldest first. A task whose reset
    /// cannot be persisted is logged and skipped without affecting the others.
    ///
    /// Runs once from the constructor, before any new task is admitted. Returns the ids
    /// that were dispatched.
    pub(crate) async fn recover_tasks(&self) -> Vec<TaskId> {
        let mut candidates = self.store.list_by_status(TaskStatus::InProgress).await;
        candidates.extend(self.store.list_by_status(TaskStatus::Pending).await);
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        if candidates.is_empty() {
            return Vec::new();
        }

        tracing::info!(tasks = candidates.len(), "recovering unfinished tasks");

        let mut dispatched = Vec::with_capacity(candidates.len());
        for task in candidates {
            let id = task.id;

            let reset_items = if task.status == TaskStatus::InProgress {
                match self.writer.reset_interrupted(id).await {
                    Ok((_, reset)) => reset,
                    Err(e) => {
                        tracing::error!(task_id = %id, error = %e, "failed to reset interrupted task, skipping");
                        continue;
                    }
                }
            } else {
                0
            };

            tracing::info!(task_id = %id, reset_items, "resuming task");
            self.emit_event(Event::TaskRecovered { id, reset_items });
            self.spawn_processing(id);
            dispatched.push(id);
        }

        dispatched
    }
}
