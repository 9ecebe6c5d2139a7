//! End-to-end watcher tests against a real filesystem.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::broadcast::{ChangeBroadcaster, ChangeEvent, Topic};
use crate::index::TaskIndex;
use crate::task::document::write_task;
use crate::task::model::{Task, TaskLevel, TaskStatus};
use crate::watch::{IgnoreSet, Watcher, WatcherOptions};

fn make_task(id: &str, title: &str, path: &str) -> Task {
    Task {
        id: id.to_string(),
        serial: 1,
        title: title.to_string(),
        description: String::new(),
        level: TaskLevel::Master,
        parent_id: None,
        path: path.to_string(),
        path_order: 1,
        status: TaskStatus::Todo,
        project: "demo".to_string(),
        priority: Default::default(),
        created_at: "2026-08-01T09:00:00Z".to_string(),
        updated_at: "2026-08-01T09:00:00Z".to_string(),
        due_date: None,
        estimated_hours: None,
        actual_hours: None,
        completion_percentage: 0,
        assignee: None,
        tags: vec![],
        dependencies: vec![],
        acceptance_criteria: vec![],
        technical_requirements: vec![],
        checklist: vec![],
        context: vec![],
        memory_connections: vec![],
        metadata: serde_json::Map::new(),
        unknown_fields: vec![],
    }
}

fn fast_options(root: &Path) -> WatcherOptions {
    WatcherOptions {
        task_root: root.to_path_buf(),
        extra_roots: Vec::new(),
        debounce: Duration::from_millis(50),
        stability: Duration::from_millis(100),
    }
}

/// Poll until the condition holds or a few seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn external_write_lands_in_the_index() {
    let root = TempDir::new().expect("tempdir");
    let index = Arc::new(TaskIndex::in_memory().await.expect("index"));
    let bus = ChangeBroadcaster::new(64);
    let ignore = Arc::new(IgnoreSet::new(Duration::from_secs(2)));
    let watcher = Watcher::spawn(
        fast_options(root.path()),
        Arc::clone(&index),
        bus.clone(),
        ignore,
    )
    .expect("spawn watcher");

    let mut events = bus.subscribe(Topic::file_change(root.path()));

    let dir = root.path().join("demo");
    std::fs::create_dir_all(&dir).expect("dir");
    std::fs::write(
        dir.join("task-aaaa.md"),
        write_task(&make_task("aaaa", "From outside", "001")),
    )
    .expect("write");

    let probe = Arc::clone(&index);
    let indexed = eventually(move || {
        let index = Arc::clone(&probe);
        async move { index.get("aaaa").await.expect("get").is_some() }
    })
    .await;
    assert!(indexed, "external write never reached the index");

    // A file_change event was fanned out for the confirmed change.
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event in time")
        .expect("channel open");
    match event {
        ChangeEvent::File { path, .. } => {
            assert!(path.ends_with("demo/task-aaaa.md"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    watcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn external_delete_removes_the_row() {
    let root = TempDir::new().expect("tempdir");
    let index = Arc::new(TaskIndex::in_memory().await.expect("index"));
    let ignore = Arc::new(IgnoreSet::new(Duration::from_secs(2)));

    let dir = root.path().join("demo");
    std::fs::create_dir_all(&dir).expect("dir");
    let file = dir.join("task-bbbb.md");
    std::fs::write(&file, write_task(&make_task("bbbb", "Doomed", "001"))).expect("write");
    index.full_sync(root.path()).await.expect("sync");

    let watcher = Watcher::spawn(
        fast_options(root.path()),
        Arc::clone(&index),
        ChangeBroadcaster::new(64),
        ignore,
    )
    .expect("spawn watcher");

    std::fs::remove_file(&file).expect("remove");

    let probe = Arc::clone(&index);
    let gone = eventually(move || {
        let index = Arc::clone(&probe);
        async move { index.get("bbbb").await.expect("get").is_none() }
    })
    .await;
    assert!(gone, "external delete never reached the index");

    watcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn tagged_self_writes_are_swallowed() {
    let root = TempDir::new().expect("tempdir");
    let index = Arc::new(TaskIndex::in_memory().await.expect("index"));
    let ignore = Arc::new(IgnoreSet::new(Duration::from_secs(10)));
    let bus = ChangeBroadcaster::new(64);
    let watcher = Watcher::spawn(
        fast_options(root.path()),
        Arc::clone(&index),
        bus.clone(),
        Arc::clone(&ignore),
    )
    .expect("spawn watcher");

    let dir = root.path().join("demo");
    std::fs::create_dir_all(&dir).expect("dir");
    let tagged = dir.join("task-cccc.md");
    ignore.mark(&tagged);
    std::fs::write(&tagged, write_task(&make_task("cccc", "Own write", "001"))).expect("write");

    // An untagged sibling written afterwards does get indexed, which
    // bounds how long we wait before asserting the tagged one did not.
    let untagged = dir.join("task-dddd.md");
    std::fs::write(&untagged, write_task(&make_task("dddd", "External", "002"))).expect("write");

    let probe = Arc::clone(&index);
    let external_seen = eventually(move || {
        let index = Arc::clone(&probe);
        async move { index.get("dddd").await.expect("get").is_some() }
    })
    .await;
    assert!(external_seen);
    assert!(
        index.get("cccc").await.expect("get").is_none(),
        "tagged self-write should not re-enter through the watcher"
    );

    watcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_drains_pending_events() {
    let root = TempDir::new().expect("tempdir");
    let index = Arc::new(TaskIndex::in_memory().await.expect("index"));
    let ignore = Arc::new(IgnoreSet::new(Duration::from_secs(2)));

    // Long stability so the event is still pending at shutdown.
    let options = WatcherOptions {
        stability: Duration::from_secs(30),
        ..fast_options(root.path())
    };
    let watcher = Watcher::spawn(
        options,
        Arc::clone(&index),
        ChangeBroadcaster::new(64),
        ignore,
    )
    .expect("spawn watcher");

    let dir = root.path().join("demo");
    std::fs::create_dir_all(&dir).expect("dir");
    std::fs::write(
        dir.join("task-eeee.md"),
        write_task(&make_task("eeee", "Last minute", "001")),
    )
    .expect("write");

    // Give notify a moment to deliver, then stop.
    tokio::time::sleep(Duration::from_millis(500)).await;
    watcher.shutdown().await;

    assert!(
        index.get("eeee").await.expect("get").is_some(),
        "final drain should flush the pending batch"
    );
}
