//! Change fan-out to in-process subscribers.
//!
//! The store publishes a [`ChangeEvent`] for every successful mutation and
//! for every external file change the watcher confirms. Subscribers
//! register per topic. Slow consumers lose the oldest events for their own
//! subscription and accumulate a lag counter; producers never block.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::util::now_rfc3339;

/// What happened to an entity or file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    #[serde(rename = "add")]
    Added,
    #[serde(rename = "change")]
    Changed,
    #[serde(rename = "delete")]
    Removed,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAction::Added => write!(f, "add"),
            ChangeAction::Changed => write!(f, "change"),
            ChangeAction::Removed => write!(f, "delete"),
        }
    }
}

/// A single observed change, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum ChangeEvent {
    Memory {
        action: ChangeAction,
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        project: Option<String>,
        timestamp: String,
    },
    Task {
        action: ChangeAction,
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        timestamp: String,
    },
    File {
        action: ChangeAction,
        path: PathBuf,
        root: PathBuf,
        timestamp: String,
    },
}

impl ChangeEvent {
    pub fn memory(action: ChangeAction, id: impl Into<String>, project: Option<String>) -> Self {
        ChangeEvent::Memory {
            action,
            id: id.into(),
            project,
            timestamp: now_rfc3339(),
        }
    }

    pub fn task(action: ChangeAction, id: impl Into<String>, path: Option<String>) -> Self {
        ChangeEvent::Task {
            action,
            id: id.into(),
            path,
            timestamp: now_rfc3339(),
        }
    }

    pub fn file(action: ChangeAction, path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        ChangeEvent::File {
            action,
            path: path.into(),
            root: root.into(),
            timestamp: now_rfc3339(),
        }
    }

    /// The topic this event is delivered on.
    pub fn topic(&self) -> Topic {
        match self {
            ChangeEvent::Memory { .. } => Topic::Memory,
            ChangeEvent::Task { .. } => Topic::Task,
            ChangeEvent::File { root, .. } => Topic::FileChange(root.clone()),
        }
    }
}

/// Subscription topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Memory,
    Task,
    /// File changes under one watched root.
    FileChange(PathBuf),
    /// Every event regardless of topic.
    All,
}

impl Topic {
    pub fn file_change(root: impl AsRef<Path>) -> Self {
        Topic::FileChange(root.as_ref().to_path_buf())
    }

    fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            Topic::All => true,
            _ => *self == event.topic(),
        }
    }
}

/// Pub/sub fan-out over a bounded tokio broadcast channel.
#[derive(Clone)]
pub struct ChangeBroadcaster {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a subscriber for one topic.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            topic,
            lag: 0,
        }
    }

    /// Publish an event. Never blocks; with no subscribers the event is
    /// dropped.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }
}

/// One subscriber's view of the change stream.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    topic: Topic,
    lag: u64,
}

impl Subscription {
    /// Receive the next event for this subscription's topic.
    ///
    /// Returns `None` once the broadcaster is dropped. Events lost to
    /// back-pressure are counted in [`Subscription::lag`] and skipped.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.topic.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.lag += n;
                    tracing::warn!(dropped = n, "subscriber lagging, oldest events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Total events dropped for this subscriber so far.
    pub fn lag(&self) -> u64 {
        self.lag
    }
}
