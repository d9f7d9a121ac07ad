use super::test_helpers::{
    Script, ScriptedExecutor, create_test_downloader, create_test_downloader_with, test_config,
    wait_for_terminal,
};
use super::*;
use crate::error::DownloadError;
use crate::types::{ItemOutcome, ItemStatus, Task, TaskStatus};
use std::time::Duration;


fn urls(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Persist a task directly through the store, bypassing dispatch
async fn insert_task(downloader: &UrlDownloader, list: &[&str]) -> Task {
    let id = TaskId::new();
    let task = Task::new(id, urls(list), |index, url| {
        crate::executor::destination_for(id, index, url)
    });
    downloader.store.create(task.clone()).await.unwrap();
    task
}
