//! Custom test assertions for integration tests

use std::path::PathBuf;
use std::time::Duration;
use url_dl::{Event, Task, TaskId, UrlDownloader};

/// Result of waiting for a task to settle
#[derive(Debug)]
pub enum WaitResult {
    /// Task reached a terminal status
    Settled(Task),
    /// Timeout waiting for a terminal status
    Timeout,
    /// Event channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a task to reach a terminal status (Completed or Failed)
///
/// Subscribes first and then checks the stored state, so a task that settled
/// before the call is still seen.
pub async fn wait_for_terminal(
    downloader: &UrlDownloader,
    id: TaskId,
    timeout: Duration,
) -> WaitResult {
    let mut events = downloader.subscribe();

    if let Ok(task) = downloader.get_task(id).await {
        if task.status.is_terminal() {
            return WaitResult::Settled(task);
        }
    }

    let settled = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::TaskCompleted { id: event_id })
                | Ok(Event::TaskFailed { id: event_id, .. })
                    if event_id == id =>
                {
                    return true;
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return false,
            }
        }
    })
    .await;

    match settled {
        Ok(true) => match downloader.get_task(id).await {
            Ok(task) => WaitResult::Settled(task),
            Err(_) => WaitResult::ChannelClosed,
        },
        Ok(false) => WaitResult::ChannelClosed,
        Err(_) => WaitResult::Timeout,
    }
}

/// Like [`wait_for_terminal`] but panics unless the task settles
pub async fn settled(downloader: &UrlDownloader, id: TaskId) -> Task {
    match wait_for_terminal(downloader, id, Duration::from_secs(15)).await {
        WaitResult::Settled(task) => task,
        other => panic!("task {id} did not settle: {other:?}"),
    }
}

/// Wait until an event matching `predicate` arrives
pub async fn wait_for_event(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: impl Fn(&Event) -> bool,
) -> Option<Event> {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Path of item `index` of `task` inside the download directory
pub fn item_path(downloader: &UrlDownloader, task: &Task, index: usize) -> PathBuf {
    downloader
        .config()
        .download
        .download_dir
        .join(&task.items[index].destination)
}
