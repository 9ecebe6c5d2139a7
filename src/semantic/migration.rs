//! Atomic folder migration.
//!
//! Executes a migration plan so the tree either fully reflects the new
//! layout or is restored to its starting state. The protocol: lock,
//! validate, backup, create directories, two-phase move per destination
//! group, cleanup, verify. Any failure after backup triggers a rollback
//! from the manifest. The lock is released on every exit path.

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::util::{generate_id, now_rfc3339, retry_backoff};

/// One file relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedMove {
    pub task_id: String,
    pub old_path: PathBuf,
    pub new_path: PathBuf,
}

/// A full migration plan: moves, directories to create, directories that
/// may be left empty and removed afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub op_id: String,
    pub created_at: String,
    pub moves: Vec<PlannedMove>,
    pub creates: Vec<PathBuf>,
    pub deletes: Vec<PathBuf>,
}

impl MigrationPlan {
    pub fn new(moves: Vec<PlannedMove>) -> Self {
        let mut creates: Vec<PathBuf> = Vec::new();
        let mut deletes: Vec<PathBuf> = Vec::new();
        let mut seen_create = HashSet::new();
        let mut seen_delete = HashSet::new();
        for planned in &moves {
            if let Some(dir) = planned.new_path.parent()
                && seen_create.insert(dir.to_path_buf())
            {
                creates.push(dir.to_path_buf());
            }
            if let Some(dir) = planned.old_path.parent()
                && seen_delete.insert(dir.to_path_buf())
            {
                deletes.push(dir.to_path_buf());
            }
        }
        // Shallow directories first for creation; verify/cleanup sorts
        // the other way.
        creates.sort_by_key(|dir| (dir.components().count(), dir.clone()));
        deletes.sort_by_key(|dir| (std::cmp::Reverse(dir.components().count()), dir.clone()));
        Self {
            op_id: generate_id(),
            created_at: now_rfc3339(),
            moves,
            creates,
            deletes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// One manifest line: where a file came from, where its backup copy is,
/// and where it was headed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub original: PathBuf,
    pub backup: PathBuf,
    pub task_id: String,
    /// Destination of the move, so a later rollback can invert the plan
    /// without the plan at hand.
    #[serde(default)]
    pub destination: Option<PathBuf>,
}

/// The backup manifest written next to the backed-up files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupManifest {
    pub op_id: String,
    pub created_at: String,
    pub entries: Vec<ManifestEntry>,
}

impl BackupManifest {
    pub const FILE_NAME: &'static str = "manifest.json";

    pub fn load(backup_dir: &Path) -> StoreResult<Self> {
        let path = backup_dir.join(Self::FILE_NAME);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| StoreError::io(format!("read manifest {}", path.display()), e))?;
        serde_json::from_str(&raw).map_err(|e| StoreError::ParseBody {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn save(&self, backup_dir: &Path) -> StoreResult<()> {
        let path = backup_dir.join(Self::FILE_NAME);
        let raw = serde_json::to_string_pretty(self).map_err(|e| StoreError::Database {
            message: format!("serialize manifest: {}", e),
        })?;
        std::fs::write(&path, raw)
            .map_err(|e| StoreError::io(format!("write manifest {}", path.display()), e))
    }
}

/// What a completed migration did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub moved: usize,
    pub backup_dir: Option<PathBuf>,
}

/// Lock file contents.
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    timestamp: String,
}

/// Removes the lock file when dropped, so the lock survives no failure
/// path, panics included.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "lock file removal failed");
            }
        }
    }
}

/// Executes migration plans under the root's lock.
pub struct FolderMigrator {
    lock_path: PathBuf,
    backups_dir: PathBuf,
    temp_dir: PathBuf,
    max_retries: u32,
    retry_backoff: Duration,
    lock_stale_after: Duration,
}

impl FolderMigrator {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            lock_path: config.lock_path(),
            backups_dir: config.backups_dir(),
            temp_dir: config.temp_dir(),
            max_retries: config.max_move_retries,
            retry_backoff: config.move_retry_backoff,
            lock_stale_after: config.lock_stale_after,
        }
    }

    /// Run the full protocol. With `backup` off the plan still executes
    /// but a failure cannot roll back and is surfaced as-is.
    pub async fn execute(
        &self,
        plan: &MigrationPlan,
        backup: bool,
        cancel: Option<&CancellationToken>,
    ) -> StoreResult<MigrationReport> {
        if plan.is_empty() {
            return Ok(MigrationReport::default());
        }
        let _lock = self.acquire_lock()?;
        tracing::info!(op_id = %plan.op_id, moves = plan.moves.len(), "migration started");

        self.validate(plan)?;

        let (backup_dir, manifest) = if backup {
            let (dir, manifest) = self.back_up(plan)?;
            (Some(dir), Some(manifest))
        } else {
            (None, None)
        };

        match self.apply(plan, cancel).await {
            Ok(moved) => {
                tracing::info!(op_id = %plan.op_id, moved, "migration complete");
                Ok(MigrationReport { moved, backup_dir })
            }
            Err(err) => {
                if let Some(manifest) = &manifest {
                    tracing::warn!(op_id = %plan.op_id, error = %err, "migration failed, rolling back");
                    self.restore(manifest)?;
                } else {
                    tracing::error!(op_id = %plan.op_id, error = %err, "migration failed with backup disabled");
                }
                Err(err)
            }
        }
    }

    /// Invert a completed migration from its backup directory.
    ///
    /// Every manifest entry is copied back to its original path and the
    /// destination file removed. Returns the number of restored files.
    pub async fn rollback_from(&self, backup_dir: &Path) -> StoreResult<usize> {
        let manifest = BackupManifest::load(backup_dir)?;
        let _lock = self.acquire_lock()?;
        tracing::info!(op_id = %manifest.op_id, "rolling back migration from backup");
        self.restore(&manifest)?;
        Ok(manifest.entries.len())
    }

    // =========================================================================
    // Protocol steps
    // =========================================================================

    fn acquire_lock(&self) -> StoreResult<LockGuard> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::io(format!("create {}", parent.display()), e))?;
        }
        for attempt in 0..2 {
            let info = LockInfo {
                pid: std::process::id(),
                timestamp: now_rfc3339(),
            };
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(mut file) => {
                    use std::io::Write;
                    let raw = serde_json::to_string(&info).expect("lock info serializes");
                    file.write_all(raw.as_bytes())
                        .map_err(|e| StoreError::io("write lock file".to_string(), e))?;
                    return Ok(LockGuard {
                        path: self.lock_path.clone(),
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    let holder = self.read_lock_holder();
                    if attempt == 0 && self.lock_is_stale(&holder) {
                        tracing::warn!(path = %self.lock_path.display(), "reclaiming stale migration lock");
                        let _ = std::fs::remove_file(&self.lock_path);
                        continue;
                    }
                    let (pid, since) = holder
                        .map(|info| (info.pid, info.timestamp))
                        .unwrap_or((0, "unknown".to_string()));
                    return Err(StoreError::LockHeld { pid, since });
                }
                Err(err) => {
                    return Err(StoreError::io(
                        format!("create lock {}", self.lock_path.display()),
                        err,
                    ));
                }
            }
        }
        unreachable!("lock acquisition loop always returns");
    }

    fn read_lock_holder(&self) -> Option<LockInfo> {
        let raw = std::fs::read_to_string(&self.lock_path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn lock_is_stale(&self, holder: &Option<LockInfo>) -> bool {
        let Some(info) = holder else {
            // Unreadable lock files are treated as stale debris.
            return true;
        };
        match chrono::DateTime::parse_from_rfc3339(&info.timestamp) {
            Ok(when) => {
                let age = chrono::Utc::now().signed_duration_since(when);
                age.num_seconds() >= self.lock_stale_after.as_secs() as i64
            }
            Err(_) => true,
        }
    }

    /// Every source must exist, no destination may exist, destinations
    /// must be pairwise distinct. All issues are collected before failing.
    fn validate(&self, plan: &MigrationPlan) -> StoreResult<()> {
        let mut issues = Vec::new();
        let mut destinations = HashSet::new();
        for planned in &plan.moves {
            if !planned.old_path.exists() {
                issues.push(format!("source missing: {}", planned.old_path.display()));
            }
            if planned.new_path.exists() {
                issues.push(format!(
                    "destination already exists: {}",
                    planned.new_path.display()
                ));
            }
            if !destinations.insert(planned.new_path.clone()) {
                issues.push(format!(
                    "duplicate destination: {}",
                    planned.new_path.display()
                ));
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(StoreError::ValidationFailed { issues })
        }
    }

    fn back_up(&self, plan: &MigrationPlan) -> StoreResult<(PathBuf, BackupManifest)> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let dir = self
            .backups_dir
            .join(format!("backup-{}-{}", stamp, plan.op_id));
        std::fs::create_dir_all(&dir)
            .map_err(|e| StoreError::io(format!("create {}", dir.display()), e))?;

        let mut manifest = BackupManifest {
            op_id: plan.op_id.clone(),
            created_at: now_rfc3339(),
            entries: Vec::with_capacity(plan.moves.len()),
        };
        for planned in &plan.moves {
            let name = planned
                .old_path
                .file_name()
                .ok_or_else(|| StoreError::InvalidPath {
                    path: planned.old_path.display().to_string(),
                    reason: "no file name".to_string(),
                })?;
            let backup = dir.join(name);
            std::fs::copy(&planned.old_path, &backup).map_err(|e| {
                StoreError::io(
                    format!(
                        "backup {} -> {}",
                        planned.old_path.display(),
                        backup.display()
                    ),
                    e,
                )
            })?;
            manifest.entries.push(ManifestEntry {
                original: planned.old_path.clone(),
                backup,
                task_id: planned.task_id.clone(),
                destination: Some(planned.new_path.clone()),
            });
        }
        manifest.save(&dir)?;
        tracing::debug!(dir = %dir.display(), files = manifest.entries.len(), "backup written");
        Ok((dir, manifest))
    }

    /// Create directories, run the grouped two-phase moves, clean up,
    /// verify.
    async fn apply(
        &self,
        plan: &MigrationPlan,
        cancel: Option<&CancellationToken>,
    ) -> StoreResult<usize> {
        for dir in &plan.creates {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::io(format!("create {}", dir.display()), e))?;
        }

        // Group by destination directory; BTreeMap keeps group order
        // deterministic.
        let mut groups: BTreeMap<PathBuf, Vec<&PlannedMove>> = BTreeMap::new();
        for planned in &plan.moves {
            let dir = planned
                .new_path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .to_path_buf();
            groups.entry(dir).or_default().push(planned);
        }

        let mut moved = 0usize;
        for (dir, group) in &groups {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                return Err(StoreError::Cancelled {
                    context: "migration cancelled between move groups".to_string(),
                });
            }
            // Phase one: everything in the group lands under a temp name.
            let mut temps: Vec<(PathBuf, &PlannedMove)> = Vec::with_capacity(group.len());
            for planned in group {
                let temp = dir.join(format!(
                    ".temp-{}",
                    planned
                        .new_path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| planned.task_id.clone())
                ));
                match self.move_file(&planned.old_path, &temp).await {
                    Ok(()) => temps.push((temp, planned)),
                    Err(err) => {
                        for (temp, _) in &temps {
                            let _ = std::fs::remove_file(temp);
                        }
                        return Err(err);
                    }
                }
            }
            // Phase two: rename temps to their final names. On failure,
            // leftover temps are swept before the rollback runs.
            for (i, (temp, planned)) in temps.iter().enumerate() {
                if let Err(err) = self.move_file(temp, &planned.new_path).await {
                    for (stale_temp, _) in &temps[i..] {
                        let _ = std::fs::remove_file(stale_temp);
                    }
                    return Err(err);
                }
                moved += 1;
            }
        }

        // Cleanup: drop now-empty source directories, deepest first.
        for dir in &plan.deletes {
            match std::fs::remove_dir(dir) {
                Ok(()) => tracing::debug!(dir = %dir.display(), "removed empty directory"),
                Err(_) => {} // still populated or already gone
            }
        }

        // Verify: every move landed and every source is gone.
        let mut violations = Vec::new();
        for planned in &plan.moves {
            if !planned.new_path.exists() {
                violations.push(format!("missing destination: {}", planned.new_path.display()));
            }
            if planned.old_path.exists() {
                violations.push(format!("source still present: {}", planned.old_path.display()));
            }
        }
        if !violations.is_empty() {
            return Err(StoreError::IntegrityViolation {
                message: violations.join("; "),
            });
        }
        Ok(moved)
    }

    /// Move one file: rename, then copy+delete across devices, with
    /// retries on transient busyness.
    async fn move_file(&self, from: &Path, to: &Path) -> StoreResult<()> {
        let from = from.to_path_buf();
        let to = to.to_path_buf();
        retry_backoff(
            || {
                let from = from.clone();
                let to = to.clone();
                async move {
                    match std::fs::rename(&from, &to) {
                        Ok(()) => Ok(()),
                        Err(err) if is_cross_device(&err) => {
                            self.copy_across_devices(&from, &to)
                        }
                        Err(err) if is_busy(&err) => Err(StoreError::Busy {
                            context: format!("rename {} -> {}", from.display(), to.display()),
                        }),
                        Err(err) => Err(StoreError::io(
                            format!("rename {} -> {}", from.display(), to.display()),
                            err,
                        )),
                    }
                }
            },
            self.max_retries,
            self.retry_backoff,
            |err| matches!(err, StoreError::Busy { .. }),
        )
        .await
    }

    /// EXDEV fallback: stage a copy in the root's `.temp` directory
    /// (same device as the destination), rename it into place, then drop
    /// the source.
    fn copy_across_devices(&self, from: &Path, to: &Path) -> StoreResult<()> {
        std::fs::create_dir_all(&self.temp_dir)
            .map_err(|e| StoreError::io(format!("create {}", self.temp_dir.display()), e))?;
        let staged = self.temp_dir.join(
            to.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "staged".to_string()),
        );
        std::fs::copy(from, &staged).map_err(|e| {
            StoreError::io(format!("copy {} -> {}", from.display(), staged.display()), e)
        })?;
        if let Err(err) = std::fs::rename(&staged, to) {
            let _ = std::fs::remove_file(&staged);
            return Err(StoreError::io(
                format!("rename {} -> {}", staged.display(), to.display()),
                err,
            ));
        }
        std::fs::remove_file(from)
            .map_err(|e| StoreError::io(format!("remove {}", from.display()), e))
    }

    /// Copy every backup back over its original and remove whatever
    /// reached a destination.
    fn restore(&self, manifest: &BackupManifest) -> StoreResult<()> {
        let mut failures = Vec::new();
        for entry in &manifest.entries {
            if let Some(parent) = entry.original.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(err) = std::fs::copy(&entry.backup, &entry.original) {
                failures.push(format!(
                    "restore {} from {}: {}",
                    entry.original.display(),
                    entry.backup.display(),
                    err
                ));
                continue;
            }
            if let Some(destination) = &entry.destination
                && destination != &entry.original
                && let Err(err) = std::fs::remove_file(destination)
                && err.kind() != ErrorKind::NotFound
            {
                tracing::debug!(path = %destination.display(), error = %err, "destination cleanup failed");
            }
        }
        if failures.is_empty() {
            tracing::info!(files = manifest.entries.len(), "rollback complete");
            Ok(())
        } else {
            Err(StoreError::IntegrityViolation {
                message: format!("rollback incomplete: {}", failures.join("; ")),
            })
        }
    }
}

fn is_cross_device(err: &std::io::Error) -> bool {
    // EXDEV; io::ErrorKind::CrossesDevices is still unstable on some
    // toolchains, so match the raw code.
    err.raw_os_error() == Some(18)
}

fn is_busy(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(16) | Some(26))
        || err.kind() == ErrorKind::ResourceBusy
        || err.kind() == ErrorKind::WouldBlock
}
