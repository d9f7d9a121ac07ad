//! Prometheus counters for tasks and downloads, served at `GET /metrics`.
//!
//! Each [`UrlDownloader`](crate::UrlDownloader) owns its own [`Registry`], so two
//! downloaders in one process (tests, embedding hosts) never share counts.

use crate::types::Event;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::time::Duration;

/// Prefix of every exported metric name
pub const NAMESPACE: &str = "url_downloader";

/// Task and download counters backed by a private registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    tasks_created: IntCounter,
    tasks_completed: IntCounter,
    tasks_failed: IntCounter,
    downloads_total: IntCounter,
    downloads_success: IntCounter,
    downloads_failed: IntCounter,
    download_bytes: IntCounter,
    download_duration: Histogram,
}

impl Metrics {
    /// Create the counters and register them
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tasks_created = counter(&registry, "tasks_created_total", "Total number of tasks created")?;
        let tasks_completed = counter(&registry, "tasks_completed_total", "Total number of tasks completed")?;
        let tasks_failed = counter(&registry, "tasks_failed_total", "Total number of tasks failed")?;
        let downloads_total = counter(&registry, "downloads_total", "Total number of download attempts")?;
        let downloads_success =
            counter(&registry, "downloads_success_total", "Total number of successful downloads")?;
        let downloads_failed =
            counter(&registry, "downloads_failed_total", "Total number of failed downloads")?;
        let download_bytes = counter(&registry, "download_bytes_total", "Total bytes downloaded")?;

        let download_duration = Histogram::with_opts(
            HistogramOpts::new("download_duration_seconds", "Download duration in seconds")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(download_duration.clone()))?;

        Ok(Self {
            registry,
            tasks_created,
            tasks_completed,
            tasks_failed,
            downloads_total,
            downloads_success,
            downloads_failed,
            download_bytes,
            download_duration,
        })
    }

    /// Count the task and item verdicts carried by `event`
    pub(crate) fn record_event(&self, event: &Event) {
        match event {
            Event::TaskCreated { .. } => self.tasks_created.inc(),
            Event::TaskCompleted { .. } => self.tasks_completed.inc(),
            Event::TaskFailed { .. } => self.tasks_failed.inc(),
            Event::ItemCompleted { .. } => self.downloads_success.inc(),
            Event::ItemFailed { .. } => self.downloads_failed.inc(),
            _ => {}
        }
    }

    /// A worker handed a URL to the executor
    pub(crate) fn download_attempted(&self) {
        self.downloads_total.inc();
    }

    /// An attempt ended after `elapsed`, having written `bytes` new bytes
    pub(crate) fn download_finished(&self, elapsed: Duration, bytes: u64) {
        self.download_duration.observe(elapsed.as_secs_f64());
        self.download_bytes.inc_by(bytes);
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(prometheus::Opts::new(name, help).namespace(NAMESPACE))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}
