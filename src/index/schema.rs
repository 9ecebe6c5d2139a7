//! Index schema, applied idempotently at startup.
//!
//! The schema only ever evolves by adding tables or columns, so databases
//! written by older versions stay readable. `apply` is safe to run on
//! every open.

use sqlx::SqlitePool;

use crate::error::{StoreError, StoreResult};

const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        serial_no INTEGER NOT NULL DEFAULT 0,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        level TEXT NOT NULL DEFAULT 'task',
        parent_id TEXT,
        path TEXT NOT NULL,
        path_order INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'todo',
        project TEXT NOT NULL DEFAULT '',
        priority TEXT NOT NULL DEFAULT 'medium',
        metadata_json TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL DEFAULT '',
        due_date TEXT,
        estimated_hours REAL,
        actual_hours REAL,
        completion_percentage INTEGER NOT NULL DEFAULT 0,
        assignee TEXT,
        tags_json TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE TABLE IF NOT EXISTS task_dependencies (
        task_id TEXT NOT NULL,
        depends_on_task_id TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'finish-to-start',
        created_at TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (task_id, depends_on_task_id)
    )",
    "CREATE TABLE IF NOT EXISTS task_checklist (
        task_id TEXT NOT NULL,
        item_text TEXT NOT NULL,
        is_completed INTEGER NOT NULL DEFAULT 0,
        position INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS task_activity (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id TEXT NOT NULL,
        action TEXT NOT NULL,
        detail TEXT NOT NULL DEFAULT '{}',
        timestamp TEXT NOT NULL,
        actor TEXT NOT NULL DEFAULT 'system'
    )",
    "CREATE TABLE IF NOT EXISTS task_memory_links (
        task_id TEXT NOT NULL,
        memory_id TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (task_id, memory_id)
    )",
];

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks (parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_path ON tasks (path)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks (project)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks (assignee)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks (due_date)",
    "CREATE INDEX IF NOT EXISTS idx_activity_task ON task_activity (task_id)",
];

/// Columns added after the initial schema. Applied with a guard so old
/// databases upgrade in place.
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("tasks", "file_path", "TEXT NOT NULL DEFAULT ''"),
    ("tasks", "semantic_path", "TEXT"),
];

/// Apply the schema. Idempotent.
pub async fn apply(pool: &SqlitePool) -> StoreResult<()> {
    for ddl in CREATE_TABLES {
        sqlx::query(ddl).execute(pool).await.map_err(StoreError::db)?;
    }
    for (table, column, ddl) in ADDED_COLUMNS {
        ensure_column(pool, table, column, ddl).await?;
    }
    for ddl in CREATE_INDEXES {
        sqlx::query(ddl).execute(pool).await.map_err(StoreError::db)?;
    }
    Ok(())
}

/// Add a column if the table does not have it yet.
async fn ensure_column(pool: &SqlitePool, table: &str, column: &str, ddl: &str) -> StoreResult<()> {
    use sqlx::Row;

    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await
        .map_err(StoreError::db)?;
    let present = rows.iter().any(|row| {
        row.try_get::<String, _>("name")
            .map(|name| name == column)
            .unwrap_or(false)
    });
    if !present {
        tracing::info!(table, column, "adding index column");
        sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, ddl))
            .execute(pool)
            .await
            .map_err(StoreError::db)?;
    }
    Ok(())
}
