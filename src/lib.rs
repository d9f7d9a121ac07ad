//! # url-dl
//!
//! Durable batch URL download service.
//!
//! Callers submit a batch of URLs as a *task*. Each URL becomes an item that a
//! bounded worker pool downloads over HTTP, resuming partial files with range
//! requests and enforcing a per-file size ceiling. Every state change is
//! persisted atomically, so a restarted process picks up unfinished tasks where
//! the previous one stopped.
//!
//! ## Quick Start
//!
//! ```no_run
//! use url_dl::{UrlDownloader, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = UrlDownloader::new(Config::default()).await?;
//!
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let task = downloader
//!         .create_task(vec!["https://example.com/file.zip".to_string()])
//!         .await?;
//!     println!("created {}", task.id);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Orchestrator, single-writer funnel, worker pool and recovery
pub mod downloader;
/// Error types
pub mod error;
/// HTTP transfer execution
pub mod executor;
/// Log subscriber setup
pub mod logging;
/// Prometheus counters
pub mod metrics;
/// Durable task records
pub mod store;
/// Core types and events
pub mod types;
/// Submitted URL checks
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use downloader::UrlDownloader;
pub use error::{ApiError, DownloadError, Error, ErrorDetail, Result, StoreError, ToHttpStatus};
pub use executor::{DownloadExecutor, DownloadOutcome, HttpExecutor};
pub use metrics::Metrics;
pub use store::TaskStore;
pub use types::{DownloadItem, Event, ItemStatus, Task, TaskId, TaskStats, TaskStatus};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal (or for shutdown to be started elsewhere)
/// and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use url_dl::{UrlDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = UrlDownloader::new(Config::default()).await?;
///
///     run_with_shutdown(&downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: &UrlDownloader) -> Result<()> {
    let token = downloader.shutdown_token();
    tokio::select! {
        _ = wait_for_signal() => {}
        _ = token.cancelled() => {
            tracing::info!("Shutdown requested");
        }
    }
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
