//! File watcher and debounced sync pipeline.
//!
//! Filesystem events from the task root (and optionally the memories
//! root) are collapsed per path inside a sliding debounce window, held
//! until the path has been quiet for the stability interval, and then
//! applied to the index as one batch, one transaction. Confirmed changes
//! fan out on the `file_change:<root>` topic.
//!
//! The store's own writes are tagged in an [`IgnoreSet`] whose TTL
//! exceeds the stability window, so they do not re-enter as external
//! events.

mod pipeline;

#[cfg(test)]
mod watch_test;

pub use pipeline::{Watcher, WatcherOptions};

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Self-write tags with a TTL.
///
/// Writers mark a path right before touching it; the watcher drops events
/// for marked paths. Entries expire so a missed unmark can never silence
/// a path forever.
#[derive(Debug)]
pub struct IgnoreSet {
    entries: DashMap<PathBuf, Instant>,
    ttl: Duration,
}

impl IgnoreSet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Tag a path as self-written.
    pub fn mark(&self, path: impl Into<PathBuf>) {
        self.entries.insert(path.into(), Instant::now());
    }

    /// Whether a path carries a live tag. Expired tags are purged lazily.
    pub fn contains(&self, path: &Path) -> bool {
        let live = match self.entries.get(path) {
            Some(entry) => entry.elapsed() <= self.ttl,
            None => return false,
        };
        if !live {
            self.entries.remove(path);
        }
        live
    }
}
