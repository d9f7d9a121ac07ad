//! Core types for url-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a fresh random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task-level status, derived from the statuses of its items
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Admitted, no job dispatched yet
    Pending,
    /// Jobs dispatched, at least one item not terminal
    InProgress,
    /// Every item completed
    Completed,
    /// Every item terminal, at least one failed
    Failed,
}

impl TaskStatus {
    /// Whether no further transitions will occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Stable lowercase name, as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single URL within a task
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting to be attempted (or reset after an interruption)
    #[default]
    Pending,
    /// A worker currently owns this item
    InProgress,
    /// Transfer finished
    Completed,
    /// Transfer attempt ended with an error
    Failed,
}

impl ItemStatus {
    /// Whether no further transitions will occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }
}

/// One URL of a task and the outcome of downloading it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DownloadItem {
    /// Source URL (same as `Task::urls[i]`)
    pub url: String,
    /// Current item status
    pub status: ItemStatus,
    /// File name inside the download directory; fixed at creation so resumes hit the same file
    pub destination: String,
    /// Cumulative bytes on disk for this item
    #[serde(default)]
    pub bytes_transferred: u64,
    /// Last error message, empty unless failed
    #[serde(default)]
    pub error: String,
}

impl DownloadItem {
    /// Create a pending item for `url` writing to `destination`
    pub fn new(url: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ItemStatus::Pending,
            destination: destination.into(),
            bytes_transferred: 0,
            error: String::new(),
        }
    }
}

/// A caller-submitted batch of URLs, tracked as one lifecycle unit.
///
/// This is the persisted record: one JSON document per task in the task directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// Task identifier, immutable
    pub id: TaskId,
    /// URLs in submission order, immutable
    pub urls: Vec<String>,
    /// Index-aligned with `urls`
    pub items: Vec<DownloadItem>,
    /// Derived task status
    pub status: TaskStatus,
    /// When the task was admitted
    pub created_at: DateTime<Utc>,
    /// Advances on every persisted mutation
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a new pending task. `destination` maps `(index, url)` to the item's file name.
    pub fn new(
        id: TaskId,
        urls: Vec<String>,
        destination: impl Fn(usize, &str) -> String,
    ) -> Self {
        let now = Utc::now();
        let items = urls
            .iter()
            .enumerate()
            .map(|(index, url)| DownloadItem::new(url.clone(), destination(index, url)))
            .collect();

        Self {
            id,
            urls,
            items,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute the task status from its items.
    ///
    /// Any non-terminal item keeps the task `InProgress`; once all items are terminal the
    /// task is `Completed` only if every item completed, otherwise `Failed`.
    pub fn derive_status(&self) -> TaskStatus {
        if self.items.iter().any(|item| !item.status.is_terminal()) {
            return TaskStatus::InProgress;
        }

        if self
            .items
            .iter()
            .all(|item| item.status == ItemStatus::Completed)
        {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        }
    }

    /// Indices of items that still need an attempt, in URL order
    pub fn unsettled_items(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.status.is_terminal())
            .map(|(index, _)| index)
            .collect()
    }

    /// Number of items in a given status
    pub fn count_items(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

/// Result of one item attempt, as written back through the orchestrator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Transfer finished; `bytes` is the total size on disk
    Completed {
        /// Total bytes on disk
        bytes: u64,
    },
    /// Transfer failed; `bytes` is whatever is left on disk
    Failed {
        /// Error message recorded on the item
        error: String,
        /// Bytes left on disk
        bytes: u64,
    },
    /// Attempt was cancelled; the item goes back to `Pending`
    Interrupted {
        /// Bytes kept on disk for a later resume
        bytes: u64,
    },
}

/// Events emitted while tasks move through their lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task admitted and persisted
    TaskCreated {
        /// Task ID
        id: TaskId,
        /// Number of URLs in the task
        urls: usize,
    },

    /// A worker picked up an item
    ItemStarted {
        /// Task ID
        id: TaskId,
        /// Item index
        index: usize,
    },

    /// An item finished successfully
    ItemCompleted {
        /// Task ID
        id: TaskId,
        /// Item index
        index: usize,
        /// Total bytes on disk
        bytes: u64,
    },

    /// An item attempt failed
    ItemFailed {
        /// Task ID
        id: TaskId,
        /// Item index
        index: usize,
        /// Error message
        error: String,
    },

    /// Every item completed
    TaskCompleted {
        /// Task ID
        id: TaskId,
    },

    /// Every item terminal, at least one failed
    TaskFailed {
        /// Task ID
        id: TaskId,
        /// Number of failed items
        failed_items: usize,
    },

    /// Unfinished task picked up again at startup
    TaskRecovered {
        /// Task ID
        id: TaskId,
        /// Items reset from in-progress back to pending
        reset_items: usize,
    },

    /// Downloader is shutting down
    Shutdown,
}

impl Event {
    /// SSE event name
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TaskCreated { .. } => "task_created",
            Event::ItemStarted { .. } => "item_started",
            Event::ItemCompleted { .. } => "item_completed",
            Event::ItemFailed { .. } => "item_failed",
            Event::TaskCompleted { .. } => "task_completed",
            Event::TaskFailed { .. } => "task_failed",
            Event::TaskRecovered { .. } => "task_recovered",
            Event::Shutdown => "shutdown",
        }
    }
}

/// Task counts per status
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaskStats {
    /// Total number of stored tasks
    pub total: usize,
    /// Tasks not yet dispatched
    pub pending: usize,
    /// Tasks with unsettled items
    pub in_progress: usize,
    /// Tasks whose items all completed
    pub completed: usize,
    /// Tasks with at least one failed item
    pub failed: usize,
}

impl TaskStats {
    /// Count one task with the given status
    pub fn record(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }
}
