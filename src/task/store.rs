//! Task store: CRUD over task files with hierarchy enforcement.
//!
//! Four invariants hold for every valid tree:
//! 1. depth is at most four (master, epic, task, subtask),
//! 2. a child's materialized path is its parent's path plus its own
//!    zero-padded ordinal,
//! 3. no task is its own ancestor,
//! 4. sibling ordinals under one parent are contiguous from 1.
//!
//! Every mutation writes the file first, then the index rows in one
//! transaction. If the index write fails the file write is undone where
//! possible; a full sync repairs anything left behind.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::broadcast::{ChangeAction, ChangeBroadcaster, ChangeEvent};
use crate::error::{StoreError, StoreResult};
use crate::index::{IndexedTask, TaskFilter, TaskIndex, indexer};
use crate::memory::document::Priority;
use crate::memory::store::write_atomic;
use crate::util::{generate_id, now_rfc3339};

use super::document::{parse_task, write_task};
use super::model::{
    ActivityRecord, ChecklistItem, MAX_DEPTH, Task, TaskLevel, TaskStatus, TaskTreeNode,
    child_path,
};

/// Actor recorded on activity rows written by this store.
const STORE_ACTOR: &str = "store";

/// Inputs for creating a task.
#[derive(Debug, Default, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    /// Derived from the hierarchy depth when absent.
    pub level: Option<TaskLevel>,
    pub parent_id: Option<String>,
    /// Inherited from the parent when absent.
    pub project: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<String>,
    pub estimated_hours: Option<f64>,
    pub assignee: Option<String>,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
    pub checklist: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Field updates for an existing task. `None` leaves a field unchanged.
#[derive(Debug, Default, Clone)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub completion_percentage: Option<u8>,
    pub assignee: Option<String>,
    pub tags: Option<Vec<String>>,
    pub dependencies: Option<Vec<String>>,
    pub checklist: Option<Vec<ChecklistItem>>,
    pub memory_connections: Option<Vec<String>>,
}

/// File-backed task store with an embedded index.
pub struct TaskStore {
    root: PathBuf,
    index: Arc<TaskIndex>,
    broadcaster: ChangeBroadcaster,
    /// Task ids currently being relocated by a migration. Mutations that
    /// touch them are refused until the migration releases the scope.
    migration_scope: RwLock<Option<HashSet<String>>>,
}

impl TaskStore {
    pub fn new(
        root: impl Into<PathBuf>,
        index: Arc<TaskIndex>,
        broadcaster: ChangeBroadcaster,
    ) -> Self {
        Self {
            root: root.into(),
            index,
            broadcaster,
            migration_scope: RwLock::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &Arc<TaskIndex> {
        &self.index
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Create a task, enforcing the depth limit before touching anything.
    pub async fn create(&self, input: NewTask) -> StoreResult<Task> {
        let parent = match &input.parent_id {
            Some(parent_id) => {
                self.refuse_if_migrating(parent_id)?;
                Some(self.require(parent_id).await?)
            }
            None => None,
        };

        let depth = parent.as_ref().map(|p| p.task.depth() + 1).unwrap_or(1);
        if depth > MAX_DEPTH {
            return Err(StoreError::DepthExceeded {
                path: parent.map(|p| p.task.path).unwrap_or_default(),
                depth,
            });
        }

        let siblings = self
            .index
            .children_of(input.parent_id.as_deref())
            .await?;
        let ordinal = siblings.len() as u32 + 1;
        if siblings.iter().any(|s| s.task.path_order == ordinal) {
            return Err(StoreError::SiblingConflict {
                parent: input.parent_id.clone().unwrap_or_else(|| "root".to_string()),
                reason: format!("ordinal {} already taken", ordinal),
            });
        }
        let parent_path = parent.as_ref().map(|p| p.task.path.as_str());
        let path = child_path(parent_path, ordinal);

        let status = input.status.unwrap_or_default();
        let now = now_rfc3339();
        let task = Task {
            id: generate_id(),
            serial: self.index.next_serial().await?,
            title: input.title,
            description: input.description,
            level: input.level.unwrap_or(TaskLevel::for_depth(depth)),
            parent_id: input.parent_id,
            path,
            path_order: ordinal,
            status,
            project: input
                .project
                .as_deref()
                .map(crate::memory::store::sanitize_project)
                .or(parent.as_ref().map(|p| p.task.project.clone()))
                .unwrap_or_else(|| "default".to_string()),
            priority: input.priority.unwrap_or_default(),
            created_at: now.clone(),
            updated_at: now,
            due_date: input.due_date,
            estimated_hours: input.estimated_hours,
            actual_hours: None,
            completion_percentage: status.initial_completion(),
            assignee: input.assignee,
            tags: input.tags,
            dependencies: input.dependencies,
            acceptance_criteria: Vec::new(),
            technical_requirements: Vec::new(),
            checklist: input
                .checklist
                .into_iter()
                .enumerate()
                .map(|(i, text)| ChecklistItem {
                    text,
                    completed: false,
                    position: i as u32 + 1,
                })
                .collect(),
            context: Vec::new(),
            memory_connections: Vec::new(),
            metadata: input.metadata,
            unknown_fields: Vec::new(),
        };

        let file_path = self.flat_path(&task);
        let dir = file_path.parent().expect("task path has a parent");
        std::fs::create_dir_all(dir)
            .map_err(|e| StoreError::io(format!("create {}", dir.display()), e))?;
        write_atomic(&file_path, &write_task(&task))?;

        if let Err(err) = self.index.upsert(&task, &file_path).await {
            // Undo the file write so tree and index stay aligned.
            let _ = std::fs::remove_file(&file_path);
            return Err(err);
        }

        self.record_activity(&task.id, "created", serde_json::json!({"path": task.path}))
            .await;
        tracing::info!(id = %task.id, path = %task.path, "task created");
        self.broadcaster.publish(ChangeEvent::task(
            ChangeAction::Added,
            &task.id,
            Some(task.path.clone()),
        ));
        Ok(task)
    }

    /// Fetch a task, re-reading its file as the source of truth.
    pub async fn get(&self, id: &str) -> StoreResult<Task> {
        let indexed = self.require(id).await?;
        self.read_file(&indexed.file_path).await
    }

    /// List tasks from the index projection.
    pub async fn list(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        Ok(self
            .index
            .list(filter)
            .await?
            .into_iter()
            .map(|indexed| indexed.task)
            .collect())
    }

    /// The whole forest, children nested under parents in ordinal order.
    pub async fn tree(&self) -> StoreResult<Vec<TaskTreeNode>> {
        let all = self.index.list(&TaskFilter::default()).await?;
        let mut by_parent: HashMap<Option<String>, Vec<Task>> = HashMap::new();
        for indexed in all {
            by_parent
                .entry(indexed.task.parent_id.clone())
                .or_default()
                .push(indexed.task);
        }
        for children in by_parent.values_mut() {
            children.sort_by_key(|t| t.path_order);
        }
        Ok(build_forest(&mut by_parent, None))
    }

    /// Update fields on a task and rewrite its file.
    pub async fn update(&self, id: &str, update: TaskUpdate) -> StoreResult<Task> {
        self.refuse_if_migrating(id)?;
        let indexed = self.require(id).await?;
        let mut task = self.read_file(&indexed.file_path).await?;

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(status) = update.status {
            task.status = status;
            if status == TaskStatus::Done && update.completion_percentage.is_none() {
                task.completion_percentage = 100;
            }
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(due_date) = update.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(estimated) = update.estimated_hours {
            task.estimated_hours = Some(estimated);
        }
        if let Some(actual) = update.actual_hours {
            task.actual_hours = Some(actual);
        }
        if let Some(completion) = update.completion_percentage {
            task.completion_percentage = completion.min(100);
        }
        if let Some(assignee) = update.assignee {
            task.assignee = Some(assignee);
        }
        if let Some(tags) = update.tags {
            task.tags = tags;
        }
        if let Some(dependencies) = update.dependencies {
            task.dependencies = dependencies;
        }
        if let Some(checklist) = update.checklist {
            task.checklist = checklist;
        }
        if let Some(connections) = update.memory_connections {
            task.memory_connections = connections;
        }
        task.updated_at = now_rfc3339();

        write_atomic(&indexed.file_path, &write_task(&task))?;
        self.index.upsert(&task, &indexed.file_path).await?;

        self.record_activity(id, "updated", serde_json::json!({"status": task.status.to_string()}))
            .await;
        self.broadcaster.publish(ChangeEvent::task(
            ChangeAction::Changed,
            id,
            Some(task.path.clone()),
        ));
        Ok(task)
    }

    /// Reparent a task, carrying its subtree along.
    ///
    /// Rejected with `Cycle` if the destination is the task itself or any
    /// of its descendants, and with `DepthExceeded` if the subtree would
    /// poke through the depth limit. Both checks run before any mutation.
    pub async fn move_task(&self, id: &str, new_parent_id: Option<&str>) -> StoreResult<Task> {
        self.refuse_if_migrating(id)?;
        let current = self.require(id).await?;

        if current.task.parent_id.as_deref() == new_parent_id {
            return Ok(current.task);
        }

        // Cycle check: walk the destination's parent chain up to a root.
        if let Some(new_parent_id) = new_parent_id {
            let mut cursor = Some(new_parent_id.to_string());
            while let Some(ancestor_id) = cursor {
                if ancestor_id == id {
                    return Err(StoreError::Cycle {
                        task_id: id.to_string(),
                        new_parent_id: new_parent_id.to_string(),
                    });
                }
                cursor = self.require(&ancestor_id).await?.task.parent_id;
            }
        }

        let new_parent = match new_parent_id {
            Some(parent_id) => Some(self.require(parent_id).await?),
            None => None,
        };

        // Depth check against the subtree's deepest node.
        let subtree = self.subtree_of(&current.task.path).await?;
        let height = subtree
            .iter()
            .map(|node| node.task.depth())
            .max()
            .unwrap_or(current.task.depth())
            - current.task.depth()
            + 1;
        let base_depth = new_parent
            .as_ref()
            .map(|p| p.task.depth() + 1)
            .unwrap_or(1);
        if base_depth + height - 1 > MAX_DEPTH {
            return Err(StoreError::DepthExceeded {
                path: current.task.path.clone(),
                depth: base_depth + height - 1,
            });
        }

        let siblings = self.index.children_of(new_parent_id).await?;
        let ordinal = siblings.len() as u32 + 1;
        let new_parent_path = new_parent.as_ref().map(|p| p.task.path.clone());
        let old_parent_id = current.task.parent_id.clone();

        let mut rewritten = self
            .rebase_subtree(
                &current,
                Some(new_parent_id.map(str::to_string)),
                new_parent_path.as_deref(),
                ordinal,
            )
            .await?;
        // The moved task's index row still lists the old parent at this
        // point, so compaction must leave it out of the sibling set.
        rewritten.extend(
            self.compact_children(old_parent_id.as_deref(), Some(id))
                .await?,
        );
        self.commit_rows(&rewritten).await?;

        let moved = rewritten
            .iter()
            .find(|(task, _)| task.id == id)
            .map(|(task, _)| task.clone())
            .expect("moved task is in the rewrite set");

        self.record_activity(
            id,
            "moved",
            serde_json::json!({"from": current.task.path, "to": moved.path}),
        )
        .await;
        tracing::info!(id, from = %current.task.path, to = %moved.path, "task moved");
        self.broadcaster.publish(ChangeEvent::task(
            ChangeAction::Changed,
            id,
            Some(moved.path.clone()),
        ));
        Ok(moved)
    }

    /// Delete a task and its whole subtree, then close the ordinal gap it
    /// leaves among its former siblings.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.refuse_if_migrating(id)?;
        let current = self.require(id).await?;
        let mut subtree = self.subtree_of(&current.task.path).await?;

        // Files go deepest-first so a crash never orphans children.
        subtree.sort_by(|a, b| b.task.path.cmp(&a.task.path));
        for node in &subtree {
            if let Err(err) = std::fs::remove_file(&node.file_path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    return Err(StoreError::io(
                        format!("remove {}", node.file_path.display()),
                        err,
                    ));
                }
            }
        }

        let mut tx = self.index.pool().begin().await.map_err(StoreError::db)?;
        for node in &subtree {
            indexer::delete_in_tx(&mut tx, &node.task.id).await?;
        }
        tx.commit().await.map_err(StoreError::db)?;

        let compacted = self
            .compact_children(current.task.parent_id.as_deref(), None)
            .await?;
        self.commit_rows(&compacted).await?;

        self.record_activity(
            id,
            "deleted",
            serde_json::json!({"path": current.task.path, "cascade": subtree.len()}),
        )
        .await;
        tracing::info!(id, cascade = subtree.len(), "task deleted");
        for node in &subtree {
            self.broadcaster.publish(ChangeEvent::task(
                ChangeAction::Removed,
                &node.task.id,
                Some(node.task.path.clone()),
            ));
        }
        Ok(())
    }

    /// Activity history for one task, oldest first.
    pub async fn activity(&self, id: &str) -> StoreResult<Vec<ActivityRecord>> {
        self.index.activity_for(id).await
    }

    // =========================================================================
    // Migration coordination
    // =========================================================================

    /// Mark a set of task ids as being relocated. Pass `None` to clear.
    pub fn set_migration_scope(&self, scope: Option<HashSet<String>>) {
        *self.migration_scope.write().expect("scope lock poisoned") = scope;
    }

    fn refuse_if_migrating(&self, id: &str) -> StoreResult<()> {
        let scope = self.migration_scope.read().expect("scope lock poisoned");
        match scope.as_ref() {
            Some(ids) if ids.contains(id) => Err(StoreError::MigrationInProgress {
                context: format!("task {} is being relocated", id),
            }),
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Flat-layout location for a task file.
    pub fn flat_path(&self, task: &Task) -> PathBuf {
        self.root
            .join(&task.project)
            .join(format!("task-{}.md", task.id))
    }

    async fn require(&self, id: &str) -> StoreResult<IndexedTask> {
        self.index
            .get(id)
            .await?
            .ok_or_else(|| StoreError::not_found("task", id))
    }

    async fn read_file(&self, path: &Path) -> StoreResult<Task> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StoreError::IndexMismatch {
                    message: format!("index row points at missing file {}", path.display()),
                }
            } else {
                StoreError::io(format!("read {}", path.display()), err)
            }
        })?;
        parse_task(&raw).map_err(|e| StoreError::ParseHeader {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// The node plus all its descendants, path order.
    async fn subtree_of(&self, path: &str) -> StoreResult<Vec<IndexedTask>> {
        self.index
            .list(&TaskFilter {
                path_prefix: Some(path.to_string()),
                ..Default::default()
            })
            .await
    }

    /// Give a node a new ordinal (and optionally a new parent), rewriting
    /// the materialized paths of its whole subtree. Files are rewritten
    /// here; index rows are returned for the caller's transaction.
    async fn rebase_subtree(
        &self,
        node: &IndexedTask,
        new_parent_id: Option<Option<String>>,
        new_parent_path: Option<&str>,
        ordinal: u32,
    ) -> StoreResult<Vec<(Task, PathBuf)>> {
        let old_prefix = node.task.path.clone();
        let new_prefix = child_path(new_parent_path, ordinal);
        let subtree = self.subtree_of(&old_prefix).await?;

        let mut rewritten = Vec::with_capacity(subtree.len());
        for entry in subtree {
            let mut task = self.read_file(&entry.file_path).await?;
            let suffix = task.path.strip_prefix(&old_prefix).unwrap_or_default();
            task.path = format!("{}{}", new_prefix, suffix);
            if task.id == node.task.id {
                task.path_order = ordinal;
                if let Some(parent_id) = &new_parent_id {
                    task.parent_id = parent_id.clone();
                }
                task.level = TaskLevel::for_depth(task.depth());
            } else {
                // Descendants keep their ordinal but may shift level.
                task.level = TaskLevel::for_depth(task.depth());
            }
            task.updated_at = now_rfc3339();
            write_atomic(&entry.file_path, &write_task(&task))?;
            rewritten.push((task, entry.file_path));
        }
        Ok(rewritten)
    }

    /// Close ordinal gaps among the children of one parent. `exclude`
    /// drops a task whose index row is mid-rewrite.
    async fn compact_children(
        &self,
        parent_id: Option<&str>,
        exclude: Option<&str>,
    ) -> StoreResult<Vec<(Task, PathBuf)>> {
        let parent_path = match parent_id {
            Some(parent_id) => Some(self.require(parent_id).await?.task.path),
            None => None,
        };
        let children: Vec<IndexedTask> = self
            .index
            .children_of(parent_id)
            .await?
            .into_iter()
            .filter(|child| Some(child.task.id.as_str()) != exclude)
            .collect();
        let mut rewritten = Vec::new();
        for (i, child) in children.iter().enumerate() {
            let expected = i as u32 + 1;
            if child.task.path_order != expected {
                rewritten.extend(
                    self.rebase_subtree(child, None, parent_path.as_deref(), expected)
                        .await?,
                );
            }
        }
        Ok(rewritten)
    }

    /// Upsert a set of rewritten rows in one transaction.
    async fn commit_rows(&self, rows: &[(Task, PathBuf)]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.index.pool().begin().await.map_err(StoreError::db)?;
        for (task, file_path) in rows {
            indexer::upsert_in_tx(&mut tx, task, file_path).await?;
        }
        tx.commit().await.map_err(StoreError::db)
    }

    async fn record_activity(&self, task_id: &str, action: &str, detail: serde_json::Value) {
        let record = ActivityRecord {
            task_id: task_id.to_string(),
            action: action.to_string(),
            detail,
            timestamp: now_rfc3339(),
            actor: STORE_ACTOR.to_string(),
        };
        if let Err(err) = self.index.append_activity(&record).await {
            tracing::warn!(task_id, action, error = %err, "activity append failed");
        }
    }
}

fn build_forest(
    by_parent: &mut HashMap<Option<String>, Vec<Task>>,
    parent_id: Option<&str>,
) -> Vec<TaskTreeNode> {
    let children = by_parent
        .remove(&parent_id.map(str::to_string))
        .unwrap_or_default();
    children
        .into_iter()
        .map(|task| {
            let id = task.id.clone();
            TaskTreeNode {
                task,
                children: build_forest(by_parent, Some(id.as_str())),
            }
        })
        .collect()
}
