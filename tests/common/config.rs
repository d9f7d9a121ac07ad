//! Test configuration helpers for creating downloaders rooted in a temp directory

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url_dl::{Config, UrlDownloader};

/// Config with every directory under `root`.
///
/// Private hosts are allowed so tasks can point at a local mock server.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("files");
    config.persistence.task_dir = root.join("tasks");
    config.download.max_concurrent_downloads = 4;
    config.download.queue_capacity = 16;
    config.download.download_timeout = Duration::from_secs(30);
    config.shutdown_timeout = Duration::from_secs(5);
    config.server.api.allow_private_hosts = true;
    config
}

/// Create a downloader with the real HTTP executor.
///
/// Returns the downloader and temp directory (keep temp_dir alive for test duration)
pub async fn create_downloader() -> (Arc<UrlDownloader>, TempDir) {
    create_downloader_with(|_| {}).await
}

/// Same as [`create_downloader`] with a caller-adjusted config
pub async fn create_downloader_with(
    adjust: impl FnOnce(&mut Config),
) -> (Arc<UrlDownloader>, TempDir) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let mut config = test_config(temp_dir.path());
    adjust(&mut config);
    let downloader = UrlDownloader::new(config).await.expect("downloader");
    (Arc::new(downloader), temp_dir)
}
