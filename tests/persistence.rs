//! Task records on disk: one JSON file per task, replaced atomically.

use url_dl::executor::destination_for;
use url_dl::{ItemStatus, StoreError, Task, TaskId, TaskStatus, TaskStore};

fn task(urls: &[&str]) -> Task {
    let id = TaskId::new();
    Task::new(
        id,
        urls.iter().map(|u| u.to_string()).collect(),
        |index, url| destination_for(id, index, url),
    )
}

fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let first = task(&["https://ok.test/a", "https://ok.test/b"]);
    let second = task(&["https://ok.test/c"]);

    {
        let store = TaskStore::open(dir.path()).await.unwrap();
        store.create(first.clone()).await.unwrap();
        store.create(second.clone()).await.unwrap();

        let mut updated = first.clone();
        updated.items[0].status = ItemStatus::Completed;
        updated.items[0].bytes_transferred = 42;
        updated.status = updated.derive_status();
        store.update(updated).await.unwrap();
    }

    let mut expected = vec![format!("{}.json", first.id), format!("{}.json", second.id)];
    expected.sort();
    assert_eq!(file_names(dir.path()), expected, "no temp files left behind");

    let reopened = TaskStore::open(dir.path()).await.unwrap();
    let loaded = reopened.get(first.id).await.unwrap();
    assert_eq!(loaded.items[0].status, ItemStatus::Completed);
    assert_eq!(loaded.items[0].bytes_transferred, 42);
    assert_eq!(loaded.status, TaskStatus::InProgress);
    assert_eq!(loaded.created_at, first.created_at);
    assert!(loaded.updated_at > first.updated_at);
    assert_eq!(reopened.get(second.id).await.unwrap(), second);
}

#[tokio::test]
async fn torn_temp_write_leaves_previous_record() {
    let dir = tempfile::tempdir().unwrap();
    let original = task(&["https://ok.test/a"]);

    {
        let store = TaskStore::open(dir.path()).await.unwrap();
        store.create(original.clone()).await.unwrap();
    }

    // A crash during the next write left a half-written temp file
    let temp = dir.path().join(format!("{}.json.tmp", original.id));
    std::fs::write(&temp, b"{\"id\": \"trunc").unwrap();

    let store = TaskStore::open(dir.path()).await.unwrap();
    assert_eq!(store.get(original.id).await.unwrap(), original);
    assert!(!temp.exists());
}

#[tokio::test]
async fn truncated_record_refuses_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let original = task(&["https://ok.test/a"]);

    {
        let store = TaskStore::open(dir.path()).await.unwrap();
        store.create(original.clone()).await.unwrap();
    }

    let record = dir.path().join(format!("{}.json", original.id));
    let bytes = std::fs::read(&record).unwrap();
    std::fs::write(&record, &bytes[..bytes.len() / 2]).unwrap();

    match TaskStore::open(dir.path()).await {
        Err(StoreError::CorruptState { path, .. }) => assert_eq!(path, record),
        other => panic!("expected corrupt state, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_create_keeps_first_record() {
    let dir = tempfile::tempdir().unwrap();
    let original = task(&["https://ok.test/a"]);
    let store = TaskStore::open(dir.path()).await.unwrap();
    store.create(original.clone()).await.unwrap();

    let mut clash = task(&["https://ok.test/other"]);
    clash.id = original.id;
    assert!(matches!(
        store.create(clash).await,
        Err(StoreError::DuplicateId(id)) if id == original.id
    ));

    let reopened = TaskStore::open(dir.path()).await.unwrap();
    assert_eq!(reopened.get(original.id).await.unwrap().urls, original.urls);
}
