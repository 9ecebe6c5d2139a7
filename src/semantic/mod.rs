//! Semantic filesystem layout for tasks.
//!
//! An alternative to the flat layout: each task's file lives inside a
//! human-readable directory tree derived from the hierarchy,
//! `<ord>-<LEVEL>-<slug>-<hash8>/…/task-<id>.md`. Moving between layouts
//! (and reparenting within the semantic layout) runs through an atomic
//! folder migration with lock, backup, two-phase moves, and rollback.

pub mod manager;
pub mod migration;
pub mod path;

#[cfg(test)]
mod migration_test;

pub use manager::{MigrateOptions, MigrationStatus, SemanticTaskManager};
pub use migration::{
    BackupManifest, FolderMigrator, ManifestEntry, MigrationPlan, MigrationReport, PlannedMove,
};
pub use path::PathManager;
