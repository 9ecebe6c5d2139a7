//! Tests for the task store and its hierarchy invariants.

use std::collections::HashSet;
use std::sync::Arc;

use tempfile::TempDir;

use crate::broadcast::ChangeBroadcaster;
use crate::error::StoreError;
use crate::index::{TaskFilter, TaskIndex};
use crate::task::document::parse_task;
use crate::task::model::{TaskLevel, TaskStatus};
use crate::task::store::{NewTask, TaskStore, TaskUpdate};

async fn setup_store() -> (TempDir, TaskStore) {
    let dir = TempDir::new().expect("tempdir");
    let index = Arc::new(TaskIndex::in_memory().await.expect("index"));
    let store = TaskStore::new(dir.path(), index, ChangeBroadcaster::new(64));
    (dir, store)
}

fn new_task(title: &str, parent: Option<&String>) -> NewTask {
    NewTask {
        title: title.to_string(),
        parent_id: parent.cloned(),
        project: Some("demo".to_string()),
        ..Default::default()
    }
}

/// Three-level chain: master "P" -> epic "E" -> task "T".
async fn setup_chain(store: &TaskStore) -> (String, String, String) {
    let p = store.create(new_task("P", None)).await.expect("create P");
    let e = store
        .create(new_task("E", Some(&p.id)))
        .await
        .expect("create E");
    let t = store
        .create(new_task("T", Some(&e.id)))
        .await
        .expect("create T");
    (p.id, e.id, t.id)
}

#[tokio::test(flavor = "multi_thread")]
async fn create_assigns_materialized_paths_and_levels() {
    let (dir, store) = setup_store().await;
    let (p, e, t) = setup_chain(&store).await;

    let p = store.get(&p).await.expect("get P");
    let e = store.get(&e).await.expect("get E");
    let t = store.get(&t).await.expect("get T");
    assert_eq!(p.path, "001");
    assert_eq!(e.path, "001.001");
    assert_eq!(t.path, "001.001.001");
    assert_eq!(p.level, TaskLevel::Master);
    assert_eq!(e.level, TaskLevel::Epic);
    assert_eq!(t.level, TaskLevel::Task);

    // Flat layout: one file per task under the project directory.
    for task in [&p, &e, &t] {
        assert!(
            dir.path()
                .join("demo")
                .join(format!("task-{}.md", task.id))
                .exists()
        );
    }

    let tree = store.tree().await.expect("tree");
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].children.len(), 1);
    assert_eq!(tree[0].children[0].children.len(), 1);
    assert_eq!(tree[0].children[0].children[0].task.title, "T");
}

#[tokio::test(flavor = "multi_thread")]
async fn serials_are_sequential_and_human_friendly() {
    let (_dir, store) = setup_store().await;
    let first = store.create(new_task("A", None)).await.expect("create");
    let second = store.create(new_task("B", None)).await.expect("create");
    assert_eq!(first.serial, 1);
    assert_eq!(second.serial, 2);
    assert_eq!(second.serial_label(), "T-2");
}

#[tokio::test(flavor = "multi_thread")]
async fn depth_five_insert_fails_without_mutation() {
    let (_dir, store) = setup_store().await;
    let (_, _, t) = setup_chain(&store).await;
    let s = store
        .create(new_task("S", Some(&t)))
        .await
        .expect("depth four is fine");

    let before = store.index().count().await.expect("count");
    match store.create(new_task("too deep", Some(&s.id))).await {
        Err(StoreError::DepthExceeded { depth, .. }) => assert_eq!(depth, 5),
        other => panic!("expected DepthExceeded, got {:?}", other),
    }
    assert_eq!(store.index().count().await.expect("count"), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn status_implies_initial_completion() {
    let (_dir, store) = setup_store().await;
    let done = store
        .create(NewTask {
            title: "already done".to_string(),
            status: Some(TaskStatus::Done),
            ..Default::default()
        })
        .await
        .expect("create");
    assert_eq!(done.completion_percentage, 100);

    let started = store
        .create(NewTask {
            title: "underway".to_string(),
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        })
        .await
        .expect("create");
    assert_eq!(started.completion_percentage, 25);
}

#[tokio::test(flavor = "multi_thread")]
async fn move_reparents_subtree_and_compacts_old_siblings() {
    let (_dir, store) = setup_store().await;
    let (p, e, t) = setup_chain(&store).await;

    let moved = store.move_task(&t, Some(p.as_str())).await.expect("move");
    assert_eq!(moved.path, "001.002");
    assert_eq!(moved.parent_id.as_deref(), Some(p.as_str()));
    assert_eq!(moved.level, TaskLevel::Epic); // depth changed 3 -> 2

    // E lost its only child.
    let e_children = store
        .index()
        .children_of(Some(e.as_str()))
        .await
        .expect("children");
    assert!(e_children.is_empty());

    // No trace of the old path remains in the index.
    let stale = store
        .list(&TaskFilter {
            path_prefix: Some("001.001.001".to_string()),
            ..Default::default()
        })
        .await
        .expect("list");
    assert!(stale.is_empty());

    // The file agrees with the index.
    let on_disk = store.get(&t).await.expect("get");
    assert_eq!(on_disk.path, "001.002");
}

#[tokio::test(flavor = "multi_thread")]
async fn move_to_descendant_fails_with_cycle_and_changes_nothing() {
    let (_dir, store) = setup_store().await;
    let (p, e, t) = setup_chain(&store).await;

    match store.move_task(&p, Some(t.as_str())).await {
        Err(StoreError::Cycle { .. }) => {}
        other => panic!("expected Cycle, got {:?}", other),
    }

    assert_eq!(store.get(&p).await.expect("get").path, "001");
    assert_eq!(store.get(&e).await.expect("get").path, "001.001");
    assert_eq!(store.get(&t).await.expect("get").path, "001.001.001");
}

#[tokio::test(flavor = "multi_thread")]
async fn move_that_would_exceed_depth_fails_before_mutation() {
    let (_dir, store) = setup_store().await;
    let (_, e, _) = setup_chain(&store).await;

    // A second root with a child: subtree height 2.
    let other = store.create(new_task("Other", None)).await.expect("create");
    let child = store
        .create(new_task("Child", Some(&other.id)))
        .await
        .expect("create");

    // Moving under E (depth 2) would put Child at depth 5.
    let moved_to = store
        .create(new_task("Anchor", Some(&e)))
        .await
        .expect("create anchor"); // depth 3
    match store.move_task(&other.id, Some(moved_to.id.as_str())).await {
        Err(StoreError::DepthExceeded { .. }) => {}
        other => panic!("expected DepthExceeded, got {:?}", other),
    }
    assert_eq!(store.get(&other.id).await.expect("get").path, "002");
    assert_eq!(store.get(&child.id).await.expect("get").path, "002.001");
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_cascades_and_restores_sibling_ordinals() {
    let (dir, store) = setup_store().await;
    let a = store.create(new_task("A", None)).await.expect("create");
    let b = store.create(new_task("B", None)).await.expect("create");
    let c = store.create(new_task("C", None)).await.expect("create");
    let b_child = store
        .create(new_task("B child", Some(&b.id)))
        .await
        .expect("create");

    store.delete(&b.id).await.expect("delete");

    // B and its child are gone, files included.
    assert!(store.get(&b.id).await.is_err());
    assert!(store.get(&b_child.id).await.is_err());
    assert!(
        !dir.path()
            .join("demo")
            .join(format!("task-{}.md", b.id))
            .exists()
    );

    // C slid into the gap: ordinals are {1, 2} again.
    assert_eq!(store.get(&a.id).await.expect("get").path, "001");
    let c = store.get(&c.id).await.expect("get");
    assert_eq!(c.path, "002");
    assert_eq!(c.path_order, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn create_then_delete_restores_the_tree() {
    let (_dir, store) = setup_store().await;
    let (_, e, _) = setup_chain(&store).await;
    let before = store.tree().await.expect("tree");
    let count_before = store.index().count().await.expect("count");

    let extra = store
        .create(new_task("Extra", Some(&e)))
        .await
        .expect("create");
    store.delete(&extra.id).await.expect("delete");

    let after = store.tree().await.expect("tree");
    assert_eq!(store.index().count().await.expect("count"), count_before);
    // Same shape and same paths; timestamps on unrelated nodes untouched.
    assert_eq!(
        collect_paths(&before),
        collect_paths(&after),
    );
}

fn collect_paths(nodes: &[crate::task::model::TaskTreeNode]) -> Vec<String> {
    let mut paths = Vec::new();
    for node in nodes {
        paths.push(node.task.path.clone());
        paths.extend(collect_paths(&node.children));
    }
    paths
}

#[tokio::test(flavor = "multi_thread")]
async fn get_rereads_the_file_as_source_of_truth() {
    let (_dir, store) = setup_store().await;
    let task = store.create(new_task("Original", None)).await.expect("create");

    // An external editor rewrites the title in place.
    let indexed = store
        .index()
        .get(&task.id)
        .await
        .expect("get")
        .expect("present");
    let raw = std::fs::read_to_string(&indexed.file_path).expect("read");
    std::fs::write(&indexed.file_path, raw.replace("Original", "Edited outside"))
        .expect("rewrite");

    let fetched = store.get(&task.id).await.expect("get");
    assert_eq!(fetched.title, "Edited outside");
}

#[tokio::test(flavor = "multi_thread")]
async fn update_rewrites_file_and_completion_follows_done() {
    let (_dir, store) = setup_store().await;
    let task = store.create(new_task("Updatable", None)).await.expect("create");

    let updated = store
        .update(
            &task.id,
            TaskUpdate {
                status: Some(TaskStatus::Done),
                assignee: Some("kai".to_string()),
                tags: Some(vec!["done-pile".to_string()]),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.status, TaskStatus::Done);
    assert_eq!(updated.completion_percentage, 100);

    let indexed = store
        .index()
        .get(&task.id)
        .await
        .expect("get")
        .expect("present");
    let on_disk = parse_task(&std::fs::read_to_string(&indexed.file_path).expect("read"))
        .expect("parse");
    assert_eq!(on_disk.status, TaskStatus::Done);
    assert_eq!(on_disk.assignee.as_deref(), Some("kai"));
}

#[tokio::test(flavor = "multi_thread")]
async fn mutations_on_migrating_tasks_are_refused() {
    let (_dir, store) = setup_store().await;
    let task = store.create(new_task("Mid-flight", None)).await.expect("create");
    let other = store.create(new_task("Unaffected", None)).await.expect("create");

    store.set_migration_scope(Some(HashSet::from([task.id.clone()])));
    match store.update(&task.id, TaskUpdate::default()).await {
        Err(StoreError::MigrationInProgress { .. }) => {}
        other => panic!("expected MigrationInProgress, got {:?}", other),
    }
    // Tasks outside the scope proceed normally.
    store
        .update(&other.id, TaskUpdate::default())
        .await
        .expect("update outside scope");

    store.set_migration_scope(None);
    store
        .update(&task.id, TaskUpdate::default())
        .await
        .expect("update after release");
}

#[tokio::test(flavor = "multi_thread")]
async fn every_mutation_appends_activity() {
    let (_dir, store) = setup_store().await;
    let root = store.create(new_task("Logged", None)).await.expect("create");
    let child = store
        .create(new_task("Child", Some(&root.id)))
        .await
        .expect("create");
    store
        .update(&child.id, TaskUpdate::default())
        .await
        .expect("update");
    store.move_task(&child.id, None).await.expect("move");

    let actions: Vec<String> = store
        .activity(&child.id)
        .await
        .expect("activity")
        .into_iter()
        .map(|record| record.action)
        .collect();
    assert_eq!(actions, vec!["created", "updated", "moved"]);
}
