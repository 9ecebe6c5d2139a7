//! Tests for the atomic folder migration protocol.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::semantic::migration::{
    BackupManifest, FolderMigrator, MigrationPlan, PlannedMove,
};

fn setup() -> (TempDir, StoreConfig, FolderMigrator) {
    let dir = TempDir::new().expect("tempdir");
    let config = StoreConfig::with_roots(dir.path().join("memories"), dir.path().join("tasks"));
    std::fs::create_dir_all(&config.tasks_root).expect("tasks root");
    let migrator = FolderMigrator::new(&config);
    (dir, config, migrator)
}

/// Lay out `count` flat files and a plan moving each into its own
/// semantic directory.
fn flat_to_semantic_plan(root: &Path, count: usize) -> MigrationPlan {
    let flat = root.join("demo");
    std::fs::create_dir_all(&flat).expect("flat dir");
    let moves = (0..count)
        .map(|i| {
            let id = format!("{:032x}", i + 1);
            let old = flat.join(format!("task-{}.md", id));
            std::fs::write(&old, format!("body {}", i)).expect("write source");
            PlannedMove {
                task_id: id.clone(),
                old_path: old,
                new_path: root
                    .join(format!("{:03}-PROJECT-item-{}", i + 1, &id[..8]))
                    .join(format!("task-{}.md", id)),
            }
        })
        .collect();
    MigrationPlan::new(moves)
}

#[tokio::test(flavor = "multi_thread")]
async fn plan_executes_and_verifies() {
    let (_dir, config, migrator) = setup();
    let plan = flat_to_semantic_plan(&config.tasks_root, 5);

    let report = migrator.execute(&plan, true, None).await.expect("execute");
    assert_eq!(report.moved, 5);
    let backup_dir = report.backup_dir.expect("backup recorded");
    assert!(backup_dir.join(BackupManifest::FILE_NAME).exists());

    for planned in &plan.moves {
        assert!(planned.new_path.exists(), "destination missing");
        assert!(!planned.old_path.exists(), "source still present");
    }
    // The emptied flat directory was cleaned up, and the lock released.
    assert!(!config.tasks_root.join("demo").exists());
    assert!(!config.lock_path().exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn validation_collects_every_issue_before_aborting() {
    let (_dir, config, migrator) = setup();
    let mut plan = flat_to_semantic_plan(&config.tasks_root, 2);

    // Break move 0 twice over: missing source and pre-existing target.
    std::fs::remove_file(&plan.moves[0].old_path).expect("remove source");
    std::fs::create_dir_all(plan.moves[0].new_path.parent().expect("parent")).expect("dir");
    std::fs::write(&plan.moves[0].new_path, "squatter").expect("pre-create target");
    // And give move 1 a duplicate destination.
    plan.moves.push(PlannedMove {
        task_id: "dup".to_string(),
        old_path: plan.moves[1].old_path.clone(),
        new_path: plan.moves[1].new_path.clone(),
    });

    match migrator.execute(&plan, true, None).await {
        Err(StoreError::ValidationFailed { issues }) => {
            assert_eq!(issues.len(), 3, "all issues collected: {:?}", issues);
        }
        other => panic!("expected ValidationFailed, got {:?}", other),
    }
    assert!(!config.lock_path().exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_mid_plan_rolls_back_every_move() {
    let (_dir, config, migrator) = setup();
    let mut plan = flat_to_semantic_plan(&config.tasks_root, 7);

    // An eighth move whose destination directory is blocked by a plain
    // file: it passes validation, the seven earlier groups move, then
    // the move itself fails and everything rolls back.
    let blocked = config.tasks_root.join("zz-blocked");
    std::fs::write(&blocked, "a file where a directory should be").expect("block");
    let extra_src = config.tasks_root.join("demo").join("task-extra.md");
    std::fs::write(&extra_src, "extra").expect("write extra");
    plan.moves.push(PlannedMove {
        task_id: "extra".to_string(),
        old_path: extra_src.clone(),
        new_path: blocked.join("task-extra.md"),
    });
    // Rebuild creates/deletes for the original seven only, so the
    // blocked directory is never created for us.
    let mut plan = MigrationPlan {
        creates: plan
            .creates
            .iter()
            .filter(|dir| !dir.starts_with(&blocked))
            .cloned()
            .collect(),
        ..plan
    };
    plan.deletes.clear();

    let err = migrator
        .execute(&plan, true, None)
        .await
        .expect_err("blocked move must fail");
    assert!(!matches!(err, StoreError::ValidationFailed { .. }));

    // Backup exists and every original is back in place.
    for planned in &plan.moves {
        assert!(
            planned.old_path.exists(),
            "rollback restored {}",
            planned.old_path.display()
        );
        if planned.task_id != "extra" {
            assert!(
                !planned.new_path.exists(),
                "rollback removed {}",
                planned.new_path.display()
            );
        }
    }
    // No temp debris and no lock left behind.
    assert!(!config.lock_path().exists());

    // A clean retry (without the poisoned move) succeeds.
    plan.moves.pop();
    let plan = MigrationPlan::new(plan.moves);
    let report = migrator.execute(&plan, true, None).await.expect("retry");
    assert_eq!(report.moved, 7);
}

#[tokio::test(flavor = "multi_thread")]
async fn rollback_from_backup_inverts_a_completed_migration() {
    let (_dir, config, migrator) = setup();
    let plan = flat_to_semantic_plan(&config.tasks_root, 3);
    let report = migrator.execute(&plan, true, None).await.expect("execute");
    let backup_dir = report.backup_dir.expect("backup");

    let restored = migrator
        .rollback_from(&backup_dir)
        .await
        .expect("rollback");
    assert_eq!(restored, 3);
    for planned in &plan.moves {
        assert!(planned.old_path.exists());
        assert!(!planned.new_path.exists());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn held_lock_refuses_a_second_migration() {
    let (_dir, config, migrator) = setup();
    std::fs::write(
        config.lock_path(),
        serde_json::json!({"pid": 4242, "timestamp": crate::util::now_rfc3339()}).to_string(),
    )
    .expect("write lock");

    let plan = flat_to_semantic_plan(&config.tasks_root, 1);
    match migrator.execute(&plan, true, None).await {
        Err(StoreError::LockHeld { pid, .. }) => assert_eq!(pid, 4242),
        other => panic!("expected LockHeld, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_lock_is_reclaimed() {
    let (_dir, config, migrator) = setup();
    let old = chrono::Utc::now() - chrono::Duration::minutes(10);
    std::fs::write(
        config.lock_path(),
        serde_json::json!({
            "pid": 4242,
            "timestamp": old.to_rfc3339(),
        })
        .to_string(),
    )
    .expect("write stale lock");

    let plan = flat_to_semantic_plan(&config.tasks_root, 1);
    let report = migrator.execute(&plan, true, None).await.expect("reclaims");
    assert_eq!(report.moved, 1);
    assert!(!config.lock_path().exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_rolls_back_before_returning() {
    let (_dir, config, migrator) = setup();
    let plan = flat_to_semantic_plan(&config.tasks_root, 4);
    let token = CancellationToken::new();
    token.cancel();

    match migrator.execute(&plan, true, Some(&token)).await {
        Err(StoreError::Cancelled { .. }) => {}
        other => panic!("expected Cancelled, got {:?}", other),
    }
    for planned in &plan.moves {
        assert!(planned.old_path.exists(), "sources intact after cancel");
    }
    assert!(!config.lock_path().exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_plans_are_a_no_op() {
    let (_dir, _config, migrator) = setup();
    let report = migrator
        .execute(&MigrationPlan::new(Vec::new()), true, None)
        .await
        .expect("empty plan");
    assert_eq!(report.moved, 0);
    assert!(report.backup_dir.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn manifest_round_trips_from_disk() {
    let (_dir, config, migrator) = setup();
    let plan = flat_to_semantic_plan(&config.tasks_root, 2);
    let report = migrator.execute(&plan, true, None).await.expect("execute");
    let backup_dir = report.backup_dir.expect("backup");

    let manifest = BackupManifest::load(&backup_dir).expect("load");
    assert_eq!(manifest.op_id, plan.op_id);
    assert_eq!(manifest.entries.len(), 2);
    let originals: Vec<&PathBuf> = manifest.entries.iter().map(|e| &e.original).collect();
    assert!(originals.contains(&&plan.moves[0].old_path));
}
