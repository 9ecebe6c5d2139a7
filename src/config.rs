//! Store configuration and storage-root resolution.
//!
//! Roots are resolved with the precedence: process environment overrides,
//! then a persisted configuration file, then defaults (`./memories`,
//! `./tasks`). Everything tunable lives in one [`StoreConfig`] passed at
//! construction; there is no process-global state.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Environment variable overriding the memories root.
pub const ENV_MEMORIES_ROOT: &str = "RECALL_MEMORIES_ROOT";

/// Environment variable overriding the tasks root.
pub const ENV_TASKS_ROOT: &str = "RECALL_TASKS_ROOT";

/// File name of the embedded index, stored inside the tasks root.
pub const INDEX_FILE_NAME: &str = "semantic-tasks.db";

/// Persisted configuration file shape (`recall.config.json`).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memories_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_root: Option<PathBuf>,
}

impl PersistedConfig {
    /// Load a persisted configuration file. A missing file is not an error.
    pub fn load(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::io(format!("read config {}", path.display()), e))?;
        serde_json::from_str(&raw).map_err(|e| StoreError::ParseBody {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Write the configuration file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::io(format!("create {}", parent.display()), e))?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(|e| StoreError::Database {
            message: format!("serialize config: {}", e),
        })?;
        std::fs::write(path, raw)
            .map_err(|e| StoreError::io(format!("write config {}", path.display()), e))
    }
}

/// All tunables for the store, resolved once at construction.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for memory documents.
    pub memories_root: PathBuf,
    /// Root directory for task files (flat or semantic layout).
    pub tasks_root: PathBuf,
    /// Sliding window during which events for one path collapse.
    pub debounce: Duration,
    /// Quiet period after the last write before a path is reported.
    pub stability: Duration,
    /// TTL for the self-write ignore set. Must exceed `stability`.
    pub ignore_ttl: Duration,
    /// Capacity of the change broadcast channel.
    pub broadcast_capacity: usize,
    /// Retries for the migration move primitive on transient errors.
    pub max_move_retries: u32,
    /// Fixed backoff between move retries.
    pub move_retry_backoff: Duration,
    /// Age past which a migration lock file is considered stale.
    pub lock_stale_after: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memories_root: PathBuf::from("./memories"),
            tasks_root: PathBuf::from("./tasks"),
            debounce: Duration::from_millis(250),
            stability: Duration::from_millis(500),
            ignore_ttl: Duration::from_secs(2),
            broadcast_capacity: 256,
            max_move_retries: 3,
            move_retry_backoff: Duration::from_millis(100),
            lock_stale_after: Duration::from_secs(5 * 60),
        }
    }
}

impl StoreConfig {
    /// Resolve roots from the environment, then the persisted config file,
    /// then defaults.
    pub fn resolve(config_file: Option<&Path>) -> StoreResult<Self> {
        let persisted = match config_file {
            Some(path) => PersistedConfig::load(path)?,
            None => PersistedConfig::default(),
        };

        let mut config = Self::default();
        if let Some(root) = persisted.memories_root {
            config.memories_root = root;
        }
        if let Some(root) = persisted.tasks_root {
            config.tasks_root = root;
        }
        if let Ok(root) = env::var(ENV_MEMORIES_ROOT)
            && !root.is_empty()
        {
            config.memories_root = PathBuf::from(root);
        }
        if let Ok(root) = env::var(ENV_TASKS_ROOT)
            && !root.is_empty()
        {
            config.tasks_root = PathBuf::from(root);
        }
        Ok(config)
    }

    /// Build a config with explicit roots and default tunables.
    pub fn with_roots(memories_root: impl Into<PathBuf>, tasks_root: impl Into<PathBuf>) -> Self {
        Self {
            memories_root: memories_root.into(),
            tasks_root: tasks_root.into(),
            ..Self::default()
        }
    }

    /// Path of the embedded index database.
    pub fn index_path(&self) -> PathBuf {
        self.tasks_root.join(INDEX_FILE_NAME)
    }

    /// Path of the migration lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.tasks_root.join(".migration.lock")
    }

    /// Directory holding migration backups.
    pub fn backups_dir(&self) -> PathBuf {
        self.tasks_root.join(".backups")
    }

    /// Staging directory for in-flight cross-device moves.
    pub fn temp_dir(&self) -> PathBuf {
        self.tasks_root.join(".temp")
    }
}
