//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;

use super::UrlDownloader;

impl UrlDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new tasks
    /// 2. Cancels every task's processing token, which aborts in-flight transfers
    /// 3. Waits up to `shutdown_timeout` for dispatchers and workers to wind down
    /// 4. Stops the state writer after it has applied every queued update
    ///
    /// Interrupted items are put back to pending as their workers return. Anything still
    /// running when the timeout expires is abandoned; its items stay in-progress on disk
    /// and the next startup's recovery treats them as crash-interrupted.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new tasks
        self.queue_state
            .accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new tasks");

        // 2. Cancel all processing
        let active = self.active_task_count().await;
        tracing::debug!(active_count = active, "Cancelling active tasks");
        self.queue_state.shutdown.cancel();

        // 3. Wait for dispatchers and workers with timeout
        self.queue_state.processors.close();
        self.queue_state.workers.close();

        let timeout = self.config.shutdown_timeout;
        let drained = tokio::time::timeout(timeout, async {
            self.queue_state.processors.wait().await;
            self.queue_state.workers.wait().await;
        })
        .await;

        match drained {
            Ok(()) => tracing::info!("All active work stopped"),
            Err(_) => tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Timeout waiting for active work, abandoning it"
            ),
        }

        // 4. Stop the writer once queued updates are applied
        self.queue_state.writer_stop.cancel();
        self.queue_state.writer_task.close();
        if tokio::time::timeout(timeout, self.queue_state.writer_task.wait())
            .await
            .is_err()
        {
            tracing::warn!("Timeout waiting for state writer to drain");
        }

        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
