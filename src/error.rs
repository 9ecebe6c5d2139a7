//! Storage error types.
//!
//! One error vocabulary for the whole store. Filesystem and index errors
//! are translated into these kinds at the boundary where they occur;
//! callers never see raw OS codes. Uses miette for diagnostic output and
//! thiserror for derive macros.

use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by store operations.
#[derive(Error, Diagnostic, Debug)]
pub enum StoreError {
    #[error("Not found: {entity} '{id}'")]
    #[diagnostic(code(recall::store::not_found))]
    NotFound { entity: &'static str, id: String },

    #[error("Already exists: {entity} '{id}'")]
    #[diagnostic(code(recall::store::already_exists))]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Path escapes storage root: {path}")]
    #[diagnostic(code(recall::store::path_escape))]
    PathEscape { path: String },

    #[error("Invalid path: {path} ({reason})")]
    #[diagnostic(code(recall::store::invalid_path))]
    InvalidPath { path: String, reason: String },

    #[error("Hierarchy depth limit exceeded: {path} would reach depth {depth}")]
    #[diagnostic(code(recall::store::depth_exceeded))]
    DepthExceeded { path: String, depth: usize },

    #[error("Move would create a cycle: '{task_id}' is an ancestor of '{new_parent_id}'")]
    #[diagnostic(code(recall::store::cycle))]
    Cycle {
        task_id: String,
        new_parent_id: String,
    },

    #[error("Sibling ordinal conflict under parent '{parent}': {reason}")]
    #[diagnostic(code(recall::store::sibling_conflict))]
    SiblingConflict { parent: String, reason: String },

    #[error("Failed to parse header in {path}: {reason}")]
    #[diagnostic(code(recall::store::parse_header))]
    ParseHeader { path: String, reason: String },

    #[error("Failed to parse body in {path}: {reason}")]
    #[diagnostic(code(recall::store::parse_body))]
    ParseBody { path: String, reason: String },

    #[error("IO error ({context}): {source}")]
    #[diagnostic(code(recall::store::io))]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource busy: {context}")]
    #[diagnostic(code(recall::store::busy))]
    Busy { context: String },

    #[error("Migration lock held by pid {pid} since {since}")]
    #[diagnostic(code(recall::store::lock_held))]
    LockHeld { pid: u32, since: String },

    #[error("Migration in progress: {context}")]
    #[diagnostic(code(recall::store::migration_in_progress))]
    MigrationInProgress { context: String },

    #[error("Validation failed: {issues:?}")]
    #[diagnostic(code(recall::store::validation_failed))]
    ValidationFailed { issues: Vec<String> },

    #[error("Integrity violation: {message}")]
    #[diagnostic(code(recall::store::integrity))]
    IntegrityViolation { message: String },

    #[error("Index out of sync with files: {message}")]
    #[diagnostic(code(recall::store::index_mismatch))]
    IndexMismatch { message: String },

    #[error("Database error: {message}")]
    #[diagnostic(code(recall::store::database))]
    Database { message: String },

    #[error("Rate limited: {context}")]
    #[diagnostic(code(recall::store::rate_limited))]
    RateLimited { context: String },

    #[error("Operation cancelled: {context}")]
    #[diagnostic(code(recall::store::cancelled))]
    Cancelled { context: String },
}

impl StoreError {
    /// Wrap an io::Error with a context string (path, operation).
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap a sqlx error as a database error.
    pub fn db(err: sqlx::Error) -> Self {
        StoreError::Database {
            message: err.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
