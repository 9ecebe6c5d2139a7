//! The embedded task index.
//!
//! All writes go through one `SqlitePool` and are batched into
//! transactions: a full sync is one transaction, a debounce batch is one
//! transaction. A parse failure skips that file's row and never the batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::error::{StoreError, StoreResult};
use crate::task::document::parse_task;
use crate::task::model::{ActivityRecord, ChecklistItem, DependencyEdge, Task};
use crate::util::now_rfc3339;

use super::query::{TaskFilter, build_limit_offset_clause, build_order_clause, build_where_clause};
use super::schema;
use super::{FileEvent, FileEventKind};

/// A task as mirrored in the index, with its file location.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedTask {
    pub task: Task,
    pub file_path: PathBuf,
    pub semantic_path: Option<String>,
}

/// Outcome of a full sync.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub scanned: usize,
    pub upserted: usize,
    pub deleted: usize,
    pub skipped: usize,
    /// `(id, kept_path, ignored_path)` for files sharing one id.
    pub duplicates: Vec<(String, PathBuf, PathBuf)>,
}

/// Outcome of one event batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub upserted: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// Sqlite-backed task index.
pub struct TaskIndex {
    pool: SqlitePool,
}

impl TaskIndex {
    /// Open (or create) the index at the given path and apply the schema.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::io(format!("create {}", parent.display()), e))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StoreError::db)?;
        schema::apply(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory index, for tests.
    pub async fn in_memory() -> StoreResult<Self> {
        // One connection kept alive for the life of the pool, or the
        // in-memory database would vanish between queries.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await
            .map_err(StoreError::db)?;
        schema::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Row operations
    // =========================================================================

    /// Upsert one task row (and its child rows) in its own transaction.
    pub async fn upsert(&self, task: &Task, file_path: &Path) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::db)?;
        upsert_in_tx(&mut tx, task, file_path).await?;
        tx.commit().await.map_err(StoreError::db)
    }

    /// Remove one task row (and its child rows) in its own transaction.
    pub async fn remove(&self, id: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::db)?;
        delete_in_tx(&mut tx, id).await?;
        tx.commit().await.map_err(StoreError::db)
    }

    /// Fetch one indexed task with child rows hydrated.
    pub async fn get(&self, id: &str) -> StoreResult<Option<IndexedTask>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::db)?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Resolve a task id from its recorded file path.
    pub async fn id_for_file(&self, file_path: &Path) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT id FROM tasks WHERE file_path = ?")
            .bind(file_path.to_string_lossy().as_ref())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::db)?;
        Ok(row.map(|r| r.get("id")))
    }

    /// List tasks matching a filter, ordered by materialized path unless
    /// the filter says otherwise.
    pub async fn list(&self, filter: &TaskFilter) -> StoreResult<Vec<IndexedTask>> {
        let (where_clause, binds) = build_where_clause(filter);
        let order_clause = build_order_clause(filter, "path");
        let limit_clause = build_limit_offset_clause(filter);
        let sql = format!(
            "SELECT * FROM tasks {} {}{}",
            where_clause, order_clause, limit_clause
        );

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(StoreError::db)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(self.hydrate(row).await?);
        }
        Ok(tasks)
    }

    /// Direct children of a parent (or the roots), ordered by ordinal.
    pub async fn children_of(&self, parent_id: Option<&str>) -> StoreResult<Vec<IndexedTask>> {
        let rows = match parent_id {
            Some(parent_id) => {
                sqlx::query("SELECT * FROM tasks WHERE parent_id = ? ORDER BY path_order")
                    .bind(parent_id)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM tasks WHERE parent_id IS NULL ORDER BY path_order")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(StoreError::db)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(self.hydrate(row).await?);
        }
        Ok(tasks)
    }

    pub async fn count(&self) -> StoreResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tasks")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::db)?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    /// Next human-friendly serial number.
    pub async fn next_serial(&self) -> StoreResult<u64> {
        let row = sqlx::query("SELECT COALESCE(MAX(serial_no), 0) + 1 AS next FROM tasks")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::db)?;
        Ok(row.get::<i64, _>("next") as u64)
    }

    /// Record one activity entry. Append-only.
    pub async fn append_activity(&self, record: &ActivityRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO task_activity (task_id, action, detail, timestamp, actor)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.task_id)
        .bind(&record.action)
        .bind(record.detail.to_string())
        .bind(&record.timestamp)
        .bind(&record.actor)
        .execute(&self.pool)
        .await
        .map_err(StoreError::db)?;
        Ok(())
    }

    pub async fn activity_for(&self, task_id: &str) -> StoreResult<Vec<ActivityRecord>> {
        let rows = sqlx::query(
            "SELECT task_id, action, detail, timestamp, actor
             FROM task_activity WHERE task_id = ? ORDER BY id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::db)?;
        Ok(rows
            .into_iter()
            .map(|row| ActivityRecord {
                task_id: row.get("task_id"),
                action: row.get("action"),
                detail: serde_json::from_str(row.get::<String, _>("detail").as_str())
                    .unwrap_or(serde_json::Value::Null),
                timestamp: row.get("timestamp"),
                actor: row.get("actor"),
            })
            .collect())
    }

    /// Dependency edges originating at a task.
    pub async fn dependencies_of(&self, task_id: &str) -> StoreResult<Vec<DependencyEdge>> {
        let rows = sqlx::query(
            "SELECT task_id, depends_on_task_id, kind, created_at
             FROM task_dependencies WHERE task_id = ? ORDER BY depends_on_task_id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::db)?;
        Ok(rows
            .into_iter()
            .map(|row| DependencyEdge {
                task_id: row.get("task_id"),
                depends_on_task_id: row.get("depends_on_task_id"),
                kind: row.get("kind"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Set or clear the semantic path column for one task.
    pub async fn set_semantic_path(&self, id: &str, semantic: Option<&str>) -> StoreResult<()> {
        sqlx::query("UPDATE tasks SET semantic_path = ? WHERE id = ?")
            .bind(semantic)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::db)?;
        Ok(())
    }

    /// Record new file locations after a migration, one transaction.
    pub async fn update_locations(
        &self,
        updates: &[(String, PathBuf, Option<String>)],
    ) -> StoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(StoreError::db)?;
        for (id, file_path, semantic_path) in updates {
            sqlx::query("UPDATE tasks SET file_path = ?, semantic_path = ? WHERE id = ?")
                .bind(file_path.to_string_lossy().as_ref())
                .bind(semantic_path)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::db)?;
        }
        tx.commit().await.map_err(StoreError::db)
    }

    /// Drop every semantic path, e.g. after a rollback to flat layout.
    pub async fn clear_semantic_paths(&self) -> StoreResult<()> {
        sqlx::query("UPDATE tasks SET semantic_path = NULL")
            .execute(&self.pool)
            .await
            .map_err(StoreError::db)?;
        Ok(())
    }

    /// `(total, with_semantic_path)` row counts.
    pub async fn semantic_counts(&self) -> StoreResult<(u64, u64)> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COUNT(semantic_path) AS migrated
             FROM tasks",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::db)?;
        Ok((
            row.get::<i64, _>("total") as u64,
            row.get::<i64, _>("migrated") as u64,
        ))
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Scan the task root, upsert every well-formed file, and delete rows
    /// whose file was not seen. One transaction.
    pub async fn full_sync(&self, root: &Path) -> StoreResult<SyncReport> {
        self.full_sync_with(root, None).await
    }

    /// [`TaskIndex::full_sync`] with a cancellation signal. Cancellation
    /// before the commit leaves the index untouched.
    pub async fn full_sync_with(
        &self,
        root: &Path,
        cancel: Option<&tokio_util::sync::CancellationToken>,
    ) -> StoreResult<SyncReport> {
        let mut report = SyncReport::default();
        let files = walk_task_files(root)?;
        report.scanned = files.len();

        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        let mut parsed: Vec<(Task, PathBuf)> = Vec::new();
        for path in files {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                return Err(StoreError::Cancelled {
                    context: "full sync cancelled during scan".to_string(),
                });
            }
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "unreadable task file skipped");
                    report.skipped += 1;
                    continue;
                }
            };
            let task = match parse_task(&raw) {
                Ok(task) => task,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "unparseable task file skipped");
                    report.skipped += 1;
                    continue;
                }
            };
            if let Some(kept) = seen.get(&task.id) {
                tracing::error!(
                    id = %task.id,
                    kept = %kept.display(),
                    ignored = %path.display(),
                    "two files share one task id"
                );
                report
                    .duplicates
                    .push((task.id.clone(), kept.clone(), path.clone()));
                continue;
            }
            seen.insert(task.id.clone(), path.clone());
            parsed.push((task, path));
        }

        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(StoreError::Cancelled {
                context: "full sync cancelled before commit".to_string(),
            });
        }
        let mut tx = self.pool.begin().await.map_err(StoreError::db)?;
        for (task, path) in &parsed {
            upsert_in_tx(&mut tx, task, path).await?;
            report.upserted += 1;
        }
        let existing: Vec<String> = sqlx::query("SELECT id FROM tasks")
            .fetch_all(&mut *tx)
            .await
            .map_err(StoreError::db)?
            .into_iter()
            .map(|row| row.get("id"))
            .collect();
        for id in existing {
            if !seen.contains_key(&id) {
                delete_in_tx(&mut tx, &id).await?;
                report.deleted += 1;
            }
        }
        tx.commit().await.map_err(StoreError::db)?;

        tracing::info!(
            scanned = report.scanned,
            upserted = report.upserted,
            deleted = report.deleted,
            skipped = report.skipped,
            "full sync complete"
        );
        Ok(report)
    }

    /// Apply one collapsed event batch in a single transaction.
    ///
    /// Events are applied in walk order (parents before children). A file
    /// that fails to parse is skipped; the rest of the batch still commits.
    pub async fn apply_batch(&self, mut events: Vec<FileEvent>) -> StoreResult<BatchReport> {
        let mut report = BatchReport::default();
        events.sort_by(|a, b| a.path.cmp(&b.path));

        let mut tx = self.pool.begin().await.map_err(StoreError::db)?;
        for event in &events {
            match event.kind {
                FileEventKind::Add | FileEventKind::Change => {
                    let raw = match std::fs::read_to_string(&event.path) {
                        Ok(raw) => raw,
                        Err(err) => {
                            tracing::warn!(path = %event.path.display(), error = %err, "event file unreadable, skipped");
                            report.skipped += 1;
                            continue;
                        }
                    };
                    match parse_task(&raw) {
                        Ok(task) => {
                            upsert_in_tx(&mut tx, &task, &event.path).await?;
                            report.upserted += 1;
                        }
                        Err(err) => {
                            tracing::warn!(path = %event.path.display(), error = %err, "event file unparseable, skipped");
                            report.skipped += 1;
                        }
                    }
                }
                FileEventKind::Delete => {
                    let id = match id_from_file_name(&event.path) {
                        Some(id) => Some(id),
                        None => {
                            let row =
                                sqlx::query("SELECT id FROM tasks WHERE file_path = ?")
                                    .bind(event.path.to_string_lossy().as_ref())
                                    .fetch_optional(&mut *tx)
                                    .await
                                    .map_err(StoreError::db)?;
                            row.map(|r| r.get("id"))
                        }
                    };
                    match id {
                        Some(id) => {
                            delete_in_tx(&mut tx, &id).await?;
                            report.deleted += 1;
                        }
                        None => {
                            tracing::debug!(path = %event.path.display(), "delete for unknown file ignored");
                            report.skipped += 1;
                        }
                    }
                }
            }
        }
        tx.commit().await.map_err(StoreError::db)?;
        Ok(report)
    }

    // =========================================================================
    // Hydration
    // =========================================================================

    async fn hydrate(&self, row: SqliteRow) -> StoreResult<IndexedTask> {
        let mut task = row_to_task(&row);
        let id = task.id.clone();

        task.dependencies = self
            .dependencies_of(&id)
            .await?
            .into_iter()
            .map(|edge| edge.depends_on_task_id)
            .collect();

        let checklist_rows = sqlx::query(
            "SELECT item_text, is_completed, position
             FROM task_checklist WHERE task_id = ? ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::db)?;
        task.checklist = checklist_rows
            .into_iter()
            .map(|row| ChecklistItem {
                text: row.get("item_text"),
                completed: row.get::<i64, _>("is_completed") != 0,
                position: row.get::<i64, _>("position") as u32,
            })
            .collect();

        let link_rows = sqlx::query(
            "SELECT memory_id FROM task_memory_links WHERE task_id = ? ORDER BY memory_id",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::db)?;
        task.memory_connections = link_rows.into_iter().map(|row| row.get("memory_id")).collect();

        Ok(IndexedTask {
            file_path: PathBuf::from(row.get::<String, _>("file_path")),
            semantic_path: row.get("semantic_path"),
            task,
        })
    }
}

// =============================================================================
// Transaction-scoped statements
// =============================================================================

pub(crate) async fn upsert_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    task: &Task,
    file_path: &Path,
) -> StoreResult<()> {
    let tags_json = serde_json::to_string(&task.tags).unwrap_or_else(|_| "[]".to_string());
    let metadata_json =
        serde_json::to_string(&task.metadata).unwrap_or_else(|_| "{}".to_string());

    sqlx::query(
        "INSERT INTO tasks (id, serial_no, title, description, level, parent_id, path,
                            path_order, status, project, priority, metadata_json,
                            created_at, updated_at, due_date, estimated_hours, actual_hours,
                            completion_percentage, assignee, tags_json, file_path)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           serial_no = excluded.serial_no,
           title = excluded.title,
           description = excluded.description,
           level = excluded.level,
           parent_id = excluded.parent_id,
           path = excluded.path,
           path_order = excluded.path_order,
           status = excluded.status,
           project = excluded.project,
           priority = excluded.priority,
           metadata_json = excluded.metadata_json,
           created_at = excluded.created_at,
           updated_at = excluded.updated_at,
           due_date = excluded.due_date,
           estimated_hours = excluded.estimated_hours,
           actual_hours = excluded.actual_hours,
           completion_percentage = excluded.completion_percentage,
           assignee = excluded.assignee,
           tags_json = excluded.tags_json,
           file_path = excluded.file_path",
    )
    .bind(&task.id)
    .bind(task.serial as i64)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.level.to_string())
    .bind(&task.parent_id)
    .bind(&task.path)
    .bind(task.path_order as i64)
    .bind(task.status.to_string())
    .bind(&task.project)
    .bind(task.priority.to_string())
    .bind(metadata_json)
    .bind(&task.created_at)
    .bind(&task.updated_at)
    .bind(&task.due_date)
    .bind(task.estimated_hours)
    .bind(task.actual_hours)
    .bind(task.completion_percentage as i64)
    .bind(&task.assignee)
    .bind(tags_json)
    .bind(file_path.to_string_lossy().as_ref())
    .execute(&mut **tx)
    .await
    .map_err(StoreError::db)?;

    // Child rows are replaced wholesale; the file is authoritative.
    sqlx::query("DELETE FROM task_dependencies WHERE task_id = ?")
        .bind(&task.id)
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db)?;
    for depends_on in &task.dependencies {
        sqlx::query(
            "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_task_id, kind, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(depends_on)
        .bind(DependencyEdge::DEFAULT_KIND)
        .bind(now_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db)?;
    }

    sqlx::query("DELETE FROM task_checklist WHERE task_id = ?")
        .bind(&task.id)
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db)?;
    for item in &task.checklist {
        sqlx::query(
            "INSERT INTO task_checklist (task_id, item_text, is_completed, position)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(&item.text)
        .bind(item.completed as i64)
        .bind(item.position as i64)
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db)?;
    }

    sqlx::query("DELETE FROM task_memory_links WHERE task_id = ?")
        .bind(&task.id)
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db)?;
    for memory_id in &task.memory_connections {
        sqlx::query(
            "INSERT OR IGNORE INTO task_memory_links (task_id, memory_id, created_at)
             VALUES (?, ?, ?)",
        )
        .bind(&task.id)
        .bind(memory_id)
        .bind(now_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db)?;
    }

    Ok(())
}

pub(crate) async fn delete_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &str,
) -> StoreResult<()> {
    sqlx::query("DELETE FROM task_dependencies WHERE task_id = ? OR depends_on_task_id = ?")
        .bind(id)
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db)?;
    for sql in [
        "DELETE FROM task_checklist WHERE task_id = ?",
        "DELETE FROM task_activity WHERE task_id = ?",
        "DELETE FROM task_memory_links WHERE task_id = ?",
    ] {
        sqlx::query(sql)
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::db)?;
    }
    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(StoreError::db)?;
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn row_to_task(row: &SqliteRow) -> Task {
    let tags_json: String = row.get("tags_json");
    let metadata_json: String = row.get("metadata_json");
    Task {
        id: row.get("id"),
        serial: row.get::<i64, _>("serial_no") as u64,
        title: row.get("title"),
        description: row.get("description"),
        level: row
            .get::<String, _>("level")
            .parse()
            .expect("infallible"),
        parent_id: row.get("parent_id"),
        path: row.get("path"),
        path_order: row.get::<i64, _>("path_order") as u32,
        status: row
            .get::<String, _>("status")
            .parse()
            .expect("infallible"),
        project: row.get("project"),
        priority: row
            .get::<String, _>("priority")
            .parse()
            .expect("infallible"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        due_date: row.get("due_date"),
        estimated_hours: row.get("estimated_hours"),
        actual_hours: row.get("actual_hours"),
        completion_percentage: row.get::<i64, _>("completion_percentage").clamp(0, 100) as u8,
        assignee: row.get("assignee"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        dependencies: Vec::new(),
        acceptance_criteria: Vec::new(),
        technical_requirements: Vec::new(),
        checklist: Vec::new(),
        context: Vec::new(),
        memory_connections: Vec::new(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        unknown_fields: Vec::new(),
    }
}

/// Infer a task id from the `task-<id>.md` naming convention.
fn id_from_file_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_prefix("task-")?.strip_suffix(".md")?;
    (!id.is_empty()).then(|| id.to_string())
}

/// All task files under the root in walk order, parents before children.
/// Dot-directories (backups, temp staging) are skipped.
pub(crate) fn walk_task_files(root: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    if root.exists() {
        walk_into(root, &mut files)?;
    }
    Ok(files)
}

fn walk_into(dir: &Path, files: &mut Vec<PathBuf>) -> StoreResult<()> {
    for path in crate::memory::store::read_dir_sorted(dir)? {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            walk_into(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    Ok(())
}
