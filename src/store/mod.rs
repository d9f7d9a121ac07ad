//! Durable task store
//!
//! One JSON record per task, stored as `<task_dir>/<id>.json`. Every write goes to
//! `<id>.json.tmp`, is fsynced, and is then renamed over the canonical record, so a
//! reader after a crash sees either the old or the new record, never a torn one.
//!
//! ## Locking
//!
//! - `tasks` (reader/writer lock) holds the in-memory index. It is taken only long
//!   enough to look up or swap a record, never across disk I/O.
//! - `write_lock` orders mutations. A mutation holds it across validate, persist and
//!   publish, so two writes never interleave and memory is only updated after the
//!   record is on disk. A failed persist leaves both views as they were.

use crate::error::StoreError;
use crate::types::{Task, TaskId, TaskStats, TaskStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

const RECORD_EXT: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";

/// File-per-task store with an in-memory index
#[derive(Debug)]
pub struct TaskStore {
    dir: PathBuf,
    tasks: RwLock<HashMap<TaskId, Task>>,
    write_lock: Mutex<()>,
}

impl TaskStore {
    /// Open the store at `dir`, loading every persisted task before returning.
    ///
    /// A missing directory is created and yields an empty store. A record that cannot be
    /// parsed, whose id does not match its file name, or whose items are not aligned with
    /// its URLs aborts with [`StoreError::CorruptState`]. Leftover temp files from an
    /// interrupted write are removed; the canonical record next to them is still intact.
    pub async fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| io_error(&dir, source))?;

        let mut tasks = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|source| io_error(&dir, source))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| io_error(&dir, source))?
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if name.ends_with(TEMP_SUFFIX) {
                tracing::warn!(path = %path.display(), "removing stale temp record from interrupted write");
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove stale temp record");
                }
                continue;
            }

            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }

            let task = load_record(&path).await?;
            tasks.insert(task.id, task);
        }

        tracing::info!(dir = %dir.display(), tasks = tasks.len(), "task store loaded");

        Ok(Self {
            dir,
            tasks: RwLock::new(tasks),
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the task records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Insert a new task and persist it. Fails with `DuplicateId` if the id is taken.
    pub async fn create(&self, task: Task) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        if self.tasks.read().await.contains_key(&task.id) {
            return Err(StoreError::DuplicateId(task.id));
        }

        self.persist(&task).await?;
        self.tasks.write().await.insert(task.id, task);
        Ok(())
    }

    /// Current snapshot of a task
    pub async fn get(&self, id: TaskId) -> StoreResult<Task> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Replace the stored record for `task.id`, bumping `updated_at`.
    ///
    /// `created_at` is kept from the stored record. `updated_at` is strictly later than
    /// the previous value even if the clock has not moved. Returns the record as stored.
    pub async fn update(&self, mut task: Task) -> StoreResult<Task> {
        let _guard = self.write_lock.lock().await;

        let previous = {
            let tasks = self.tasks.read().await;
            let current = tasks.get(&task.id).ok_or(StoreError::NotFound(task.id))?;
            (current.created_at, current.updated_at)
        };

        task.created_at = previous.0;
        let now = Utc::now();
        task.updated_at = if now > previous.1 {
            now
        } else {
            previous.1 + chrono::Duration::microseconds(1)
        };

        self.persist(&task).await?;
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(task)
    }

    /// All tasks whose status currently equals `status`, in no particular order
    pub async fn list_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|task| task.status == status)
            .cloned()
            .collect()
    }

    /// Every stored task, in no particular order
    pub async fn list_all(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    /// Task counts per status
    pub async fn stats(&self) -> TaskStats {
        let tasks = self.tasks.read().await;
        let mut stats = TaskStats::default();
        for task in tasks.values() {
            stats.record(task.status);
        }
        stats
    }

    /// Canonical record path for a task
    pub fn record_path(&self, id: TaskId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXT}"))
    }

    fn temp_path(&self, id: TaskId) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXT}{TEMP_SUFFIX}"))
    }

    async fn persist(&self, task: &Task) -> StoreResult<()> {
        let temp = self.stage(task).await?;
        self.commit(task.id, &temp).await
    }

    /// Write the encoded record to its temp path and fsync it.
    pub(crate) async fn stage(&self, task: &Task) -> StoreResult<PathBuf> {
        let bytes = serde_json::to_vec_pretty(task)?;
        let temp = self.temp_path(task.id);

        let result = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await
        }
        .await;

        if let Err(source) = result {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error(&temp, source));
        }
        Ok(temp)
    }

    /// Rename a staged temp record over the canonical path.
    pub(crate) async fn commit(&self, id: TaskId, temp: &Path) -> StoreResult<()> {
        let target = self.record_path(id);

        if let Err(source) = tokio::fs::rename(temp, &target).await {
            let _ = tokio::fs::remove_file(temp).await;
            return Err(io_error(&target, source));
        }

        sync_dir(&self.dir).await;
        Ok(())
    }
}

async fn load_record(path: &Path) -> StoreResult<Task> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| io_error(path, source))?;

    let task: Task = serde_json::from_slice(&bytes).map_err(|e| corrupt(path, e.to_string()))?;

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if stem != task.id.to_string() {
        return Err(corrupt(
            path,
            format!("record id {} does not match file name", task.id),
        ));
    }

    if task.items.len() != task.urls.len() {
        return Err(corrupt(
            path,
            format!(
                "{} items for {} urls",
                task.items.len(),
                task.urls.len()
            ),
        ));
    }

    Ok(task)
}

// Make the rename itself durable. Best effort: not every platform can open a directory.
async fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        match tokio::fs::File::open(dir).await {
            Ok(handle) => {
                if let Err(e) = handle.sync_all().await {
                    tracing::debug!(dir = %dir.display(), error = %e, "directory fsync failed");
                }
            }
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "could not open directory for fsync");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn corrupt(path: &Path, reason: String) -> StoreError {
    StoreError::CorruptState {
        path: path.to_path_buf(),
        reason,
    }
}
