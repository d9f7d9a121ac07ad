//! Error types for url-dl
//!
//! This module provides the error taxonomy for the library:
//! - Store errors (duplicate ids, missing records, corrupt on-disk state, failed writes)
//! - Download errors returned by the executor for a single transfer attempt
//! - HTTP status code mapping and structured error bodies for the REST API

use crate::types::TaskId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for url-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for url-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.max_file_size")
        key: Option<String>,
    },

    /// Task store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A download attempt failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller input rejected (URL list, task id, query parameters)
    #[error("validation error: {0}")]
    Validation(String),

    /// Item index out of range for a task
    #[error("task {id} has no item {index}")]
    InvalidItem {
        /// Task the index was looked up in
        id: TaskId,
        /// The offending index
        index: usize,
    },

    /// Task is already being processed by another dispatch
    #[error("task {0} is already being processed")]
    AlreadyProcessing(TaskId),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// Processing was cancelled before every item settled
    #[error("processing cancelled")]
    Cancelled,

    /// HTTP client construction error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metric registration or encoding failed
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Task store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A task with this id already exists
    #[error("task {0} already exists")]
    DuplicateId(TaskId),

    /// No task with this id
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// A persisted record could not be read back; the store refuses to start
    #[error("corrupt task record {path}: {reason}")]
    CorruptState {
        /// The offending record file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Reading or writing a record failed; memory and disk were left as before the call
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded
    #[error("failed to encode task record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from a single transfer attempt. All are terminal for that attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// The HTTP request could not be built (malformed URL, bad header)
    #[error("failed to build request for {url}: {reason}")]
    RequestConstructionFailed {
        /// Source URL
        url: String,
        /// Why construction failed
        reason: String,
    },

    /// Network or file I/O failed mid-transfer
    #[error("transfer of {url} failed: {reason}")]
    TransferFailed {
        /// Source URL
        url: String,
        /// Underlying cause
        reason: String,
    },

    /// Server answered with a non-success status
    #[error("bad status {status} from {url}")]
    BadStatus {
        /// Source URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Body exceeded the configured maximum size; the partial file was removed
    #[error("{url} exceeds the size limit of {limit} bytes")]
    SizeLimitExceeded {
        /// Source URL
        url: String,
        /// Configured ceiling in bytes
        limit: u64,
    },

    /// Attempt was cancelled; any partial file is kept for resume
    #[error("transfer of {url} cancelled")]
    Cancelled {
        /// Source URL
        url: String,
    },
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "task_not_found",
///     "message": "store error: task 0b6e... not found",
///     "details": { "task_id": "0b6e..." }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "task_not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,

            Error::Store(StoreError::NotFound(_)) => 404,
            Error::InvalidItem { .. } => 404,

            Error::Store(StoreError::DuplicateId(_)) => 409,
            Error::AlreadyProcessing(_) => 409,

            Error::Download(DownloadError::SizeLimitExceeded { .. }) => 422,
            Error::Download(DownloadError::RequestConstructionFailed { .. }) => 422,

            Error::Download(DownloadError::BadStatus { .. }) => 502,
            Error::Download(DownloadError::TransferFailed { .. }) => 502,
            Error::Network(_) => 502,

            Error::ShuttingDown => 503,
            Error::Cancelled => 503,
            Error::Download(DownloadError::Cancelled { .. }) => 503,

            Error::Store(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Metrics(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Store(e) => match e {
                StoreError::DuplicateId(_) => "duplicate_id",
                StoreError::NotFound(_) => "task_not_found",
                StoreError::CorruptState { .. } => "corrupt_state",
                StoreError::Io { .. } => "store_io_error",
                StoreError::Encode(_) => "store_encode_error",
            },
            Error::Download(e) => match e {
                DownloadError::RequestConstructionFailed { .. } => "request_construction_failed",
                DownloadError::TransferFailed { .. } => "transfer_failed",
                DownloadError::BadStatus { .. } => "bad_status",
                DownloadError::SizeLimitExceeded { .. } => "size_limit_exceeded",
                DownloadError::Cancelled { .. } => "cancelled",
            },
            Error::Io(_) => "io_error",
            Error::Validation(_) => "validation_error",
            Error::InvalidItem { .. } => "item_not_found",
            Error::AlreadyProcessing(_) => "already_processing",
            Error::ShuttingDown => "shutting_down",
            Error::Cancelled => "cancelled",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Metrics(_) => "metrics_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Store(StoreError::NotFound(id)) | Error::Store(StoreError::DuplicateId(id)) => {
                Some(serde_json::json!({ "task_id": id }))
            }
            Error::InvalidItem { id, index } => Some(serde_json::json!({
                "task_id": id,
                "index": index,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::Download(DownloadError::SizeLimitExceeded { url, limit }) => {
                Some(serde_json::json!({
                    "url": url,
                    "limit_bytes": limit,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
