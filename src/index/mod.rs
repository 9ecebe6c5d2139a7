//! Hybrid indexer: files are the source of truth, the index is a cache.
//!
//! For every well-formed file under the task root there is exactly one row
//! whose primary key equals the file's id. Rows whose file has vanished
//! are removed at the next full sync. After quiescence the index equals
//! the projection of the files.

pub mod indexer;
pub mod query;
pub mod schema;


use std::path::PathBuf;

pub use indexer::{BatchReport, IndexedTask, SyncReport, TaskIndex};
pub use query::{SortOrder, TaskFilter};

/// Kind of filesystem change handed to the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Add,
    Change,
    Delete,
}

/// One collapsed filesystem event, the unit the watcher feeds the indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}
