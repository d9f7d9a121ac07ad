//! Shared test helpers for creating UrlDownloader instances in tests.

use crate::config::Config;
use crate::downloader::UrlDownloader;
use crate::error::DownloadError;
use crate::executor::{DownloadExecutor, DownloadOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

/// Scripted behavior for one URL
#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Append these bytes to the destination and succeed
    Body(Vec<u8>),
    /// Fail with this error
    Fail(DownloadError),
    /// Wait until cancelled, then report cancellation
    Hang,
    /// Sleep, then append these bytes
    Slow(Duration, Vec<u8>),
    /// Sleep without observing cancellation, then succeed with no bytes
    Stuck(Duration),
}

/// [`DownloadExecutor`] that follows a per-URL script instead of using the network.
///
/// URLs without a script succeed with a body equal to the URL's bytes.
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn script(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    /// URLs passed to `download`, in call order
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of concurrent `download` calls observed
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DownloadExecutor for ScriptedExecutor {
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Script::Body(url.as_bytes().to_vec()));

        let body = match script {
            Script::Body(body) => body,
            Script::Fail(error) => return Err(error),
            Script::Hang => {
                cancel.cancelled().await;
                return Err(DownloadError::Cancelled {
                    url: url.to_string(),
                });
            }
            Script::Slow(delay, body) => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(DownloadError::Cancelled { url: url.to_string() });
                    }
                    _ = tokio::time::sleep(delay) => body,
                }
            }
            Script::Stuck(delay) => {
                tokio::time::sleep(delay).await;
                Vec::new()
            }
        };

        let existing = tokio::fs::metadata(destination)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        let mut contents = tokio::fs::read(destination).await.unwrap_or_default();
        contents.extend_from_slice(&body);
        tokio::fs::write(destination, &contents).await.unwrap();

        Ok(DownloadOutcome {
            bytes_transferred: existing + body.len() as u64,
            resumed: existing > 0,
        })
    }
}

/// Test config rooted in `root`
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("files");
    config.persistence.task_dir = root.join("tasks");
    config.download.max_concurrent_downloads = 3;
    config.download.queue_capacity = 8;
    config.shutdown_timeout = Duration::from_secs(5);
    config.server.api.allow_private_hosts = true;
    config
}

/// Helper to create a test UrlDownloader backed by a [`ScriptedExecutor`].
/// Returns the downloader, the executor and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader()
-> (UrlDownloader, Arc<ScriptedExecutor>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let executor = ScriptedExecutor::new();
    let downloader = UrlDownloader::with_executor(test_config(temp_dir.path()), executor.clone())
        .await
        .unwrap();
    (downloader, executor, temp_dir)
}

/// Same as [`create_test_downloader`] with a caller-adjusted config
pub(crate) async fn create_test_downloader_with(
    adjust: impl FnOnce(&mut Config),
) -> (UrlDownloader, Arc<ScriptedExecutor>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    adjust(&mut config);
    let executor = ScriptedExecutor::new();
    let downloader = UrlDownloader::with_executor(config, executor.clone())
        .await
        .unwrap();
    (downloader, executor, temp_dir)
}

/// Poll until the task reaches a terminal status
pub(crate) async fn wait_for_terminal(
    downloader: &UrlDownloader,
    id: crate::types::TaskId,
) -> crate::types::Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = downloader.get_task(id).await.unwrap();
        if task.status.is_terminal() {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} did not settle: {task:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
