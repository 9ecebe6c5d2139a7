//! Semantic hybrid task manager.
//!
//! Wraps the task store so every task file resides at its semantic path.
//! Creates, updates, and moves run through the underlying store first,
//! then a migration plan relocates whichever files no longer match their
//! semantic location. The one-shot flat-to-semantic migration and its
//! rollback live here too.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::StoreResult;
use crate::index::TaskFilter;
use crate::semantic::migration::{
    BackupManifest, FolderMigrator, MigrationPlan, MigrationReport, PlannedMove,
};
use crate::semantic::path::PathManager;
use crate::task::model::Task;
use crate::task::store::{NewTask, TaskStore, TaskUpdate};

/// Options for a migration pass.
#[derive(Debug, Clone, Copy)]
pub struct MigrateOptions {
    /// Skipping the backup makes the pass faster but unrecoverable.
    pub backup: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self { backup: true }
    }
}

/// Progress of the flat-to-semantic migration.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MigrationStatus {
    pub total: u64,
    pub migrated: u64,
    pub pending: u64,
    pub percent: f64,
    /// True while some tasks are semantic and others still flat.
    pub mixed_state: bool,
}

/// Task store facade that keeps files at their semantic paths.
pub struct SemanticTaskManager {
    store: Arc<TaskStore>,
    paths: PathManager,
    migrator: FolderMigrator,
}

impl SemanticTaskManager {
    pub fn new(store: Arc<TaskStore>, config: &crate::config::StoreConfig) -> Self {
        Self {
            paths: PathManager::new(&config.tasks_root),
            migrator: FolderMigrator::new(config),
            store,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    // =========================================================================
    // CRUD that keeps the semantic layout
    // =========================================================================

    /// Create a task and place its file at the semantic path.
    pub async fn create(&self, input: NewTask) -> StoreResult<Task> {
        let task = self.store.create(input).await?;
        self.reconcile(MigrateOptions::default(), None).await?;
        self.store.get(&task.id).await
    }

    /// Update a task. A title change changes the slug, so the file may
    /// move afterwards.
    pub async fn update(&self, id: &str, update: TaskUpdate) -> StoreResult<Task> {
        let task = self.store.update(id, update).await?;
        self.reconcile(MigrateOptions::default(), None).await?;
        Ok(task)
    }

    /// Reparent a task, then relocate every file the renumbering touched.
    pub async fn move_task(&self, id: &str, new_parent_id: Option<&str>) -> StoreResult<Task> {
        self.store.move_task(id, new_parent_id).await?;
        self.reconcile(MigrateOptions::default(), None).await?;
        self.store.get(id).await
    }

    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.store.delete(id).await?;
        self.reconcile(MigrateOptions::default(), None).await?;
        Ok(())
    }

    // =========================================================================
    // One-shot migration and rollback
    // =========================================================================

    /// Move every task file from wherever it is to its semantic path.
    pub async fn migrate_to_semantic(
        &self,
        options: MigrateOptions,
        cancel: Option<&CancellationToken>,
    ) -> StoreResult<MigrationReport> {
        let report = self.reconcile(options, cancel).await?;
        tracing::info!(moved = report.moved, "semantic migration pass done");
        Ok(report)
    }

    /// `{total, migrated, pending, percent, mixed_state}` from the index.
    pub async fn migration_status(&self) -> StoreResult<MigrationStatus> {
        let (total, migrated) = self.store.index().semantic_counts().await?;
        let percent = if total == 0 {
            100.0
        } else {
            migrated as f64 * 100.0 / total as f64
        };
        Ok(MigrationStatus {
            total,
            migrated,
            pending: total - migrated,
            percent,
            mixed_state: migrated != 0 && migrated != total,
        })
    }

    /// Restore the layout recorded in a backup and clear semantic paths.
    pub async fn rollback_migration(&self, backup_dir: &std::path::Path) -> StoreResult<usize> {
        let manifest = BackupManifest::load(backup_dir)?;
        let scope: HashSet<String> = manifest
            .entries
            .iter()
            .map(|entry| entry.task_id.clone())
            .collect();

        self.store.set_migration_scope(Some(scope));
        let restored = self.migrator.rollback_from(backup_dir).await;
        self.store.set_migration_scope(None);
        let restored = restored?;

        let updates: Vec<(String, PathBuf, Option<String>)> = manifest
            .entries
            .iter()
            .map(|entry| (entry.task_id.clone(), entry.original.clone(), None))
            .collect();
        self.store.index().update_locations(&updates).await?;
        self.store.index().clear_semantic_paths().await?;
        tracing::info!(restored, "migration rolled back");
        Ok(restored)
    }

    // =========================================================================
    // Planning
    // =========================================================================

    /// Plan the moves that would bring every file to its semantic path.
    pub async fn plan_migration(&self) -> StoreResult<MigrationPlan> {
        let all = self.store.index().list(&TaskFilter::default()).await?;
        let mut by_id = std::collections::HashMap::new();
        for indexed in &all {
            by_id.insert(indexed.task.id.clone(), indexed.task.clone());
        }

        let mut moves = Vec::new();
        for indexed in &all {
            let chain = ancestor_chain(&by_id, &indexed.task);
            let chain_refs: Vec<&Task> = chain.iter().collect();
            let target = self.paths.task_file_path(&chain_refs)?;
            if target != indexed.file_path {
                moves.push(PlannedMove {
                    task_id: indexed.task.id.clone(),
                    old_path: indexed.file_path.clone(),
                    new_path: target,
                });
            }
        }
        Ok(MigrationPlan::new(moves))
    }

    /// Plan, execute, and record new locations. No-op when everything is
    /// already in place.
    async fn reconcile(
        &self,
        options: MigrateOptions,
        cancel: Option<&CancellationToken>,
    ) -> StoreResult<MigrationReport> {
        let plan = self.plan_migration().await?;
        if plan.is_empty() {
            return Ok(MigrationReport::default());
        }

        let scope: HashSet<String> = plan
            .moves
            .iter()
            .map(|planned| planned.task_id.clone())
            .collect();
        self.store.set_migration_scope(Some(scope));
        let result = self.migrator.execute(&plan, options.backup, cancel).await;
        self.store.set_migration_scope(None);
        let report = result?;

        let root = self.store.root().to_path_buf();
        let updates: Vec<(String, PathBuf, Option<String>)> = plan
            .moves
            .iter()
            .map(|planned| {
                let semantic = planned
                    .new_path
                    .parent()
                    .and_then(|dir| dir.strip_prefix(&root).ok())
                    .map(|relative| relative.to_string_lossy().to_string());
                (planned.task_id.clone(), planned.new_path.clone(), semantic)
            })
            .collect();
        self.store.index().update_locations(&updates).await?;
        Ok(report)
    }
}

/// Root-first chain of a task's ancestors, ending at the task itself.
fn ancestor_chain(
    by_id: &std::collections::HashMap<String, Task>,
    task: &Task,
) -> Vec<Task> {
    let mut chain = vec![task.clone()];
    let mut cursor = task.parent_id.clone();
    while let Some(parent_id) = cursor {
        match by_id.get(&parent_id) {
            Some(parent) => {
                cursor = parent.parent_id.clone();
                chain.push(parent.clone());
            }
            None => break, // dangling parent pointer; chain stops here
        }
    }
    chain.reverse();
    chain
}
