//! The debounce pipeline between notify and the indexer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{ChangeAction, ChangeBroadcaster, ChangeEvent};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::index::{FileEvent, FileEventKind, TaskIndex};

use super::IgnoreSet;

/// Watcher tunables, taken from the store config by default.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    pub task_root: PathBuf,
    /// Additional roots observed for fan-out only (no indexing).
    pub extra_roots: Vec<PathBuf>,
    pub debounce: Duration,
    pub stability: Duration,
}

impl WatcherOptions {
    pub fn from_config(config: &StoreConfig, watch_memories: bool) -> Self {
        Self {
            task_root: config.tasks_root.clone(),
            extra_roots: if watch_memories {
                vec![config.memories_root.clone()]
            } else {
                Vec::new()
            },
            debounce: config.debounce,
            stability: config.stability,
        }
    }
}

/// A running watcher. Dropping the handle (or cancelling its token) stops
/// the pipeline after one final drain.
pub struct Watcher {
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<()>,
    // Dropping the notify watcher stops event delivery.
    _notify: RecommendedWatcher,
    ignore: Arc<IgnoreSet>,
}

impl Watcher {
    /// Start watching. The roots must exist before the watcher starts.
    pub fn spawn(
        options: WatcherOptions,
        index: Arc<TaskIndex>,
        broadcaster: ChangeBroadcaster,
        ignore: Arc<IgnoreSet>,
    ) -> StoreResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<Event>();

        let mut notify_watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(err) => tracing::warn!(error = %err, "watch backend error"),
            },
            notify::Config::default(),
        )
        .map_err(|e| StoreError::Busy {
            context: format!("create file watcher: {}", e),
        })?;

        for root in std::iter::once(&options.task_root).chain(options.extra_roots.iter()) {
            notify_watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| StoreError::Busy {
                    context: format!("watch {}: {}", root.display(), e),
                })?;
            tracing::info!(root = %root.display(), "watching");
        }

        let cancel = CancellationToken::new();
        let pipeline = Pipeline {
            options,
            index,
            broadcaster,
            ignore: Arc::clone(&ignore),
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(pipeline.run(rx));

        Ok(Self {
            cancel,
            join,
            _notify: notify_watcher,
            ignore,
        })
    }

    /// The ignore set writers should tag before self-writes.
    pub fn ignore_set(&self) -> Arc<IgnoreSet> {
        Arc::clone(&self.ignore)
    }

    /// Drain one final batch, then stop. No store writes happen after
    /// this returns.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.join.await;
    }
}

/// One pending entry per path: the collapsed kind and the last write time.
pub(crate) type Pending = HashMap<PathBuf, (FileEventKind, Instant)>;

struct Pipeline {
    options: WatcherOptions,
    index: Arc<TaskIndex>,
    broadcaster: ChangeBroadcaster,
    ignore: Arc<IgnoreSet>,
    cancel: CancellationToken,
}

impl Pipeline {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Event>) {
        let mut pending: Pending = HashMap::new();
        let tick = self.options.debounce.min(Duration::from_millis(50));
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.absorb(&mut pending, event),
                        None => break, // notify watcher dropped
                    }
                }
                _ = interval.tick() => {
                    let ready = take_settled(&mut pending, self.options.stability);
                    if !ready.is_empty() {
                        self.flush(ready).await;
                    }
                }
                _ = self.cancel.cancelled() => break,
            }
        }

        // Final drain: everything still pending ships in one last batch.
        let rest = std::mem::take(&mut pending);
        if !rest.is_empty() {
            let batch: Vec<(PathBuf, FileEventKind)> = rest
                .into_iter()
                .map(|(path, (kind, _))| (path, kind))
                .collect();
            self.flush(batch).await;
        }
        tracing::debug!("watch pipeline stopped");
    }

    /// Merge one raw notify event into the pending map.
    fn absorb(&self, pending: &mut Pending, event: Event) {
        let kind = match event.kind {
            EventKind::Create(_) => FileEventKind::Add,
            EventKind::Modify(_) => FileEventKind::Change,
            EventKind::Remove(_) => FileEventKind::Delete,
            _ => return,
        };
        for path in event.paths {
            let watchable = std::iter::once(&self.options.task_root)
                .chain(self.options.extra_roots.iter())
                .any(|root| is_watchable_under(root, &path));
            if !watchable {
                continue;
            }
            if self.ignore.contains(&path) {
                tracing::trace!(path = %path.display(), "self-write swallowed");
                continue;
            }
            let next = match pending.get(&path) {
                Some((prev, _)) => collapse(*prev, kind),
                None => kind,
            };
            pending.insert(path, (next, Instant::now()));
        }
    }

    /// Apply one settled batch: index transaction first, fan-out second.
    async fn flush(&self, batch: Vec<(PathBuf, FileEventKind)>) {
        let (for_index, for_fanout): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|(path, _)| path.starts_with(&self.options.task_root));

        if !for_index.is_empty() {
            let events: Vec<FileEvent> = for_index
                .iter()
                .map(|(path, kind)| FileEvent::new(*kind, path.clone()))
                .collect();
            match self.index.apply_batch(events).await {
                Ok(report) => {
                    tracing::debug!(
                        upserted = report.upserted,
                        deleted = report.deleted,
                        skipped = report.skipped,
                        "watch batch applied"
                    );
                }
                Err(err) => {
                    // The next event for these paths retries; a full sync
                    // repairs anything that never re-fires.
                    tracing::warn!(error = %err, "watch batch failed, rolled back");
                    return;
                }
            }
            for (path, kind) in &for_index {
                self.publish(*kind, path, &self.options.task_root);
            }
        }

        for (path, kind) in &for_fanout {
            let root = self
                .options
                .extra_roots
                .iter()
                .find(|root| path.starts_with(root));
            if let Some(root) = root {
                self.publish(*kind, path, root);
            }
        }
    }

    fn publish(&self, kind: FileEventKind, path: &Path, root: &Path) {
        let action = match kind {
            FileEventKind::Add => ChangeAction::Added,
            FileEventKind::Change => ChangeAction::Changed,
            FileEventKind::Delete => ChangeAction::Removed,
        };
        self.broadcaster
            .publish(ChangeEvent::file(action, path, root));
    }
}

/// Collapse two successive events for one path. Last event wins, except
/// that a change on a freshly added file is still an add.
pub(crate) fn collapse(prev: FileEventKind, next: FileEventKind) -> FileEventKind {
    match (prev, next) {
        (FileEventKind::Add, FileEventKind::Change) => FileEventKind::Add,
        (_, FileEventKind::Delete) => FileEventKind::Delete,
        (_, next) => next,
    }
}

/// Whether the pipeline cares about a path: markdown only, inside the
/// given root, and not under a dot-directory below that root (backups,
/// temp staging, the index itself).
pub(crate) fn is_watchable_under(root: &Path, path: &Path) -> bool {
    if path.extension().is_none_or(|ext| ext != "md") {
        return false;
    }
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    !relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
    })
}

/// Remove and return the entries whose last write is at least `stability`
/// old.
pub(crate) fn take_settled(
    pending: &mut Pending,
    stability: Duration,
) -> Vec<(PathBuf, FileEventKind)> {
    let now = Instant::now();
    let ready: Vec<PathBuf> = pending
        .iter()
        .filter(|(_, (_, last))| now.duration_since(*last) >= stability)
        .map(|(path, _)| path.clone())
        .collect();
    ready
        .into_iter()
        .filter_map(|path| pending.remove(&path).map(|(kind, _)| (path, kind)))
        .collect()
}
