//! Single-URL transfer with resume
//!
//! [`DownloadExecutor`] is the seam between the worker pool and the network. The
//! production implementation, [`HttpExecutor`], streams a GET response into the item's
//! destination file:
//!
//! 1. If the destination already holds `k > 0` bytes, ask for `Range: bytes=k-`.
//! 2. A 416 whose `Content-Range: bytes */N` equals `k` means the file is already
//!    whole and is reported as done. Any other 416, or a 206 starting somewhere other
//!    than `k`, restarts the transfer with a plain GET. Otherwise a non-2xx reply
//!    deletes the partial file and fails with `BadStatus`.
//! 3. A 2xx reply other than 206 means the range was ignored, so the file is truncated
//!    and the transfer starts over.
//! 4. The body is appended chunk by chunk. Crossing `max_file_size` deletes the file and
//!    fails with `SizeLimitExceeded`.
//! 5. A network or write error mid-stream keeps the partial file for a later resume.
//!
//! Cancellation is observed at every suspension point; the partial file is flushed and
//! kept.

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use crate::types::TaskId;
use async_trait::async_trait;
use reqwest::{
    StatusCode,
    header::{CONTENT_RANGE, RANGE},
};
use std::path::Path;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Extension used when the URL path carries no usable one
const FALLBACK_EXTENSION: &str = "bin";

/// Longest extension kept from a URL path
const MAX_EXTENSION_LEN: usize = 8;

/// Result of a successful transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Total bytes on disk: bytes kept from a previous attempt plus bytes written now
    pub bytes_transferred: u64,
    /// Whether the server honored the range request
    pub resumed: bool,
}

/// Performs one transfer attempt for a single URL.
///
/// Implementations never retry; the caller owns retry policy.
#[async_trait]
pub trait DownloadExecutor: Send + Sync {
    /// Download `url` into `destination`, resuming from whatever is already there.
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<DownloadOutcome, DownloadError>;
}

/// Production [`DownloadExecutor`] backed by a shared `reqwest::Client`
#[derive(Clone, Debug)]
pub struct HttpExecutor {
    client: reqwest::Client,
    max_file_size: u64,
}

impl HttpExecutor {
    /// Build an executor with a whole-request timeout and a per-file size ceiling
    pub fn new(timeout: Duration, max_file_size: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("url-dl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            max_file_size,
        })
    }

    /// Build an executor from the download section of the config
    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        Self::new(config.download_timeout, config.max_file_size)
    }
}

#[async_trait]
impl DownloadExecutor for HttpExecutor {
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> std::result::Result<DownloadOutcome, DownloadError> {
        let mut existing = stored_size(destination).await;
        let mut response = self.send(url, existing, cancel).await?;

        if existing > 0 {
            match classify_range_reply(&response, existing) {
                RangeReply::AlreadyComplete => {
                    tracing::debug!(url, existing, "destination already holds the whole body");
                    return Ok(DownloadOutcome {
                        bytes_transferred: existing,
                        resumed: true,
                    });
                }
                RangeReply::Mismatch => {
                    tracing::debug!(
                        url,
                        existing,
                        status = response.status().as_u16(),
                        "range reply does not continue the partial file, restarting transfer"
                    );
                    existing = 0;
                    response = self.send(url, 0, cancel).await?;
                }
                RangeReply::Continues | RangeReply::Other => {}
            }
        }

        let status = response.status();
        if !status.is_success() {
            remove_partial(destination).await;
            return Err(DownloadError::BadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let resumed = existing > 0 && status == StatusCode::PARTIAL_CONTENT;
        if existing > 0 && !resumed {
            tracing::debug!(url, existing, status = status.as_u16(), "range ignored, restarting transfer");
        }
        let offset = if resumed { existing } else { 0 };

        if let Some(length) = response.content_length() {
            if offset.saturating_add(length) > self.max_file_size {
                remove_partial(destination).await;
                return Err(self.size_exceeded(url));
            }
        }

        let mut file = open_destination(destination, resumed)
            .await
            .map_err(|e| transfer_failed(url, &e))?;

        let mut written: u64 = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    finish_file(&mut file).await;
                    tracing::debug!(url, bytes = offset + written, "transfer cancelled, partial kept");
                    return Err(DownloadError::Cancelled { url: url.to_string() });
                }
                chunk = response.chunk() => chunk,
            };

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    finish_file(&mut file).await;
                    return Err(transfer_failed(url, &e));
                }
            };

            let total = offset + written + chunk.len() as u64;
            if total > self.max_file_size {
                drop(file);
                remove_partial(destination).await;
                return Err(self.size_exceeded(url));
            }

            if let Err(e) = file.write_all(&chunk).await {
                finish_file(&mut file).await;
                return Err(transfer_failed(url, &e));
            }
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| transfer_failed(url, &e))?;
        file.sync_all().await.map_err(|e| transfer_failed(url, &e))?;

        Ok(DownloadOutcome {
            bytes_transferred: offset + written,
            resumed,
        })
    }
}

impl HttpExecutor {
    // Issue the GET, asking for `bytes=<from>-` when `from > 0`
    async fn send(
        &self,
        url: &str,
        from: u64,
        cancel: &CancellationToken,
    ) -> std::result::Result<reqwest::Response, DownloadError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| DownloadError::RequestConstructionFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut builder = self.client.get(parsed);
        if from > 0 {
            builder = builder.header(RANGE, format!("bytes={from}-"));
        }
        let request = builder
            .build()
            .map_err(|e| DownloadError::RequestConstructionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled { url: url.to_string() }),
            result = self.client.execute(request) => result.map_err(|e| transfer_failed(url, &e)),
        }
    }

    fn size_exceeded(&self, url: &str) -> DownloadError {
        DownloadError::SizeLimitExceeded {
            url: url.to_string(),
            limit: self.max_file_size,
        }
    }
}

/// How a reply to `Range: bytes=<existing>-` relates to the partial file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RangeReply {
    /// 416 whose `Content-Range: bytes */N` says the file is already whole
    AlreadyComplete,
    /// 206 starting at the partial's length (or without a `Content-Range` to check)
    Continues,
    /// 416 for any other length, or a 206 starting elsewhere
    Mismatch,
    /// Anything else; handled by the regular status rules
    Other,
}

fn classify_range_reply(response: &reqwest::Response, existing: u64) -> RangeReply {
    let content_range = response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok());

    match response.status() {
        StatusCode::RANGE_NOT_SATISFIABLE => {
            if content_range.and_then(unsatisfied_length) == Some(existing) {
                RangeReply::AlreadyComplete
            } else {
                RangeReply::Mismatch
            }
        }
        StatusCode::PARTIAL_CONTENT => match content_range.map(range_start) {
            None => RangeReply::Continues,
            Some(Some(start)) if start == existing => RangeReply::Continues,
            Some(_) => RangeReply::Mismatch,
        },
        _ => RangeReply::Other,
    }
}

/// First byte of `bytes <start>-<end>/<total>`
fn range_start(value: &str) -> Option<u64> {
    let (start, _) = value.trim().strip_prefix("bytes ")?.split_once('-')?;
    start.trim().parse().ok()
}

/// Complete length from `bytes */<total>`
fn unsatisfied_length(value: &str) -> Option<u64> {
    value.trim().strip_prefix("bytes */")?.trim().parse().ok()
}

/// Size of the file at `path`, 0 when it does not exist
pub async fn stored_size(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => 0,
    }
}

/// File name for item `index` of `task_id`.
///
/// Keeps a short alphanumeric extension from the URL path, otherwise uses `.bin`. The
/// name depends only on its inputs so every attempt for an item targets the same file.
pub fn destination_for(task_id: TaskId, index: usize, url: &str) -> String {
    let extension = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_owned))
        })
        .and_then(|name| {
            name.rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
        })
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

    format!("{task_id}_{index}.{extension}")
}

async fn open_destination(path: &Path, append: bool) -> std::io::Result<File> {
    if append {
        return OpenOptions::new().append(true).open(path).await;
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    File::create(path).await
}

// Flush buffered writes so the partial on disk matches what was received
async fn finish_file(file: &mut File) {
    if let Err(e) = file.flush().await {
        tracing::debug!(error = %e, "flush of partial file failed");
    }
    if let Err(e) = file.sync_all().await {
        tracing::debug!(error = %e, "fsync of partial file failed");
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove partial file"),
    }
}

fn transfer_failed(url: &str, error: &dyn std::fmt::Display) -> DownloadError {
    DownloadError::TransferFailed {
        url: url.to_string(),
        reason: error.to_string(),
    }
}
