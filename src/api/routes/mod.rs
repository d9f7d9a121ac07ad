//! Route handlers for the REST API
//!
//! - [`tasks`] — Task submission and lookup
//! - [`system`] — Health, stats, events, OpenAPI

use crate::types::{DownloadItem, ItemStatus, Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod system;
mod tasks;

pub use system::*;
pub use tasks::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Request body for POST /tasks
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CreateTaskRequest {
    /// URLs to download, in order
    pub urls: Vec<String>,
}

/// Response body for POST /tasks
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CreateTaskResponse {
    /// Identifier of the admitted task
    pub task_id: TaskId,
}

/// Query parameters for GET /tasks
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ListTasksQuery {
    /// Only return tasks with this status
    pub status: Option<TaskStatus>,
}

/// One download of a task as seen by API clients
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, utoipa::ToSchema)]
pub struct DownloadView {
    /// Source URL
    pub url: String,
    /// Item status
    pub status: ItemStatus,
    /// File name inside the download directory
    pub file_path: String,
    /// Bytes on disk for this item
    pub bytes_transferred: u64,
    /// Last error, omitted when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl From<DownloadItem> for DownloadView {
    fn from(item: DownloadItem) -> Self {
        Self {
            url: item.url,
            status: item.status,
            file_path: item.destination,
            bytes_transferred: item.bytes_transferred,
            error: item.error,
        }
    }
}

/// Task as seen by API clients
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, utoipa::ToSchema)]
pub struct TaskResponse {
    /// Task identifier
    pub task_id: TaskId,
    /// Derived task status
    pub status: TaskStatus,
    /// Per-URL downloads, in submission order
    pub downloads: Vec<DownloadView>,
    /// When the task was admitted
    pub created_at: DateTime<Utc>,
    /// Last persisted change
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            downloads: task.items.into_iter().map(DownloadView::from).collect(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// Response body for GET /stats
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    /// Stored tasks per status
    pub tasks: crate::types::TaskStats,
    /// Tasks currently being dispatched
    pub active_tasks: usize,
    /// Worker pool size
    pub workers: usize,
    /// Jobs waiting for a worker
    pub queued_jobs: usize,
    /// Whether new tasks are admitted
    pub accepting: bool,
}
