//! Task store with a four-level hierarchy.
//!
//! Tasks form a forest rooted at master-level nodes. Each task is one
//! markdown file; a materialized path of zero-padded ordinals encodes its
//! ancestry for cheap prefix queries in the index.

pub mod document;
pub mod model;
pub mod store;

#[cfg(test)]
mod model_test;
#[cfg(test)]
mod store_test;

pub use document::{parse_task, write_task};
pub use model::{
    ActivityRecord, ChecklistItem, DependencyEdge, Task, TaskLevel, TaskStatus, TaskTreeNode,
    child_path, path_depth, zeropad,
};
pub use store::{NewTask, TaskStore, TaskUpdate};
