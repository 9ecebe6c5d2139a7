//! Task and memory linking.
//!
//! Keeps a symmetric, best-effort relation between tasks and memories:
//! a linked task lists the memory id in `memory_connections`, the memory
//! carries a `task:<short-id>` tag hint. Candidates are found by keyword
//! overlap between titles, tags, and projects. Linking is idempotent and
//! never blocks the write that triggered it.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::index::{SortOrder, TaskFilter};
use crate::memory::document::MemoryDocument;
use crate::memory::store::{MemoryStore, MemoryUpdate};
use crate::task::model::Task;
use crate::task::store::{TaskStore, TaskUpdate};
use crate::util::short_id;

/// Minimum overlap score before two items are considered related.
const DEFAULT_THRESHOLD: usize = 3;

/// Matching a project is worth this many shared keywords.
const PROJECT_WEIGHT: usize = 2;

/// How many recent candidates each scan considers.
const SCAN_LIMIT: usize = 20;

/// Words too common to signal anything.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "are", "was", "has", "have",
    "will", "not", "but", "all", "its", "per", "when", "then",
];

/// Best-effort linker between the two stores.
pub struct TaskMemoryLinker {
    tasks: Arc<TaskStore>,
    memories: Arc<MemoryStore>,
    threshold: usize,
}

impl TaskMemoryLinker {
    pub fn new(tasks: Arc<TaskStore>, memories: Arc<MemoryStore>) -> Self {
        Self {
            tasks,
            memories,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Called after a memory is created: scan recent tasks and link the
    /// ones that overlap. Returns the ids of tasks linked in this pass.
    pub async fn link_memory(&self, memory: &MemoryDocument) -> StoreResult<Vec<String>> {
        let memory_keywords = memory_keywords(memory);
        let candidates = self
            .tasks
            .list(&TaskFilter {
                sort_by: Some("updated_at".to_string()),
                sort_order: Some(SortOrder::Desc),
                limit: Some(SCAN_LIMIT),
                ..Default::default()
            })
            .await?;

        let mut linked = Vec::new();
        for task in candidates {
            let score = overlap_score(
                &memory_keywords,
                &task_keywords(&task),
                memory.project.as_deref(),
                Some(task.project.as_str()),
            );
            if score < self.threshold {
                continue;
            }
            if self.connect(&task, memory).await {
                linked.push(task.id);
            }
        }
        Ok(linked)
    }

    /// Called after a task is created: the symmetric scan over recent
    /// memories. Returns the ids of memories linked in this pass.
    pub async fn link_task(&self, task: &Task) -> StoreResult<Vec<String>> {
        let keywords = task_keywords(task);
        let candidates = self.memories.list(None, Some(SCAN_LIMIT)).await?;

        let mut linked = Vec::new();
        for memory in candidates {
            let score = overlap_score(
                &memory_keywords(&memory),
                &keywords,
                memory.project.as_deref(),
                Some(task.project.as_str()),
            );
            if score < self.threshold {
                continue;
            }
            if self.connect(task, &memory).await {
                linked.push(memory.id.clone());
            }
        }
        Ok(linked)
    }

    /// Write both sides of one link. Idempotent; failures are logged and
    /// reported as a skipped link, never as an error.
    async fn connect(&self, task: &Task, memory: &MemoryDocument) -> bool {
        let hint = format!("task:{}", short_id(&task.id));
        let task_side = !task.memory_connections.contains(&memory.id);
        let memory_side = !memory.tags.contains(&hint);
        if !task_side && !memory_side {
            return false; // already linked both ways
        }

        if task_side {
            let mut connections = task.memory_connections.clone();
            connections.push(memory.id.clone());
            let update = TaskUpdate {
                memory_connections: Some(connections),
                ..Default::default()
            };
            if let Err(err) = self.tasks.update(&task.id, update).await {
                tracing::warn!(task = %task.id, memory = %memory.id, error = %err, "task-side link failed");
                return false;
            }
        }
        if memory_side {
            let mut tags = memory.tags.clone();
            tags.push(hint);
            let update = MemoryUpdate {
                tags: Some(tags),
                ..Default::default()
            };
            if let Err(err) = self.memories.update(&memory.id, update).await {
                tracing::warn!(task = %task.id, memory = %memory.id, error = %err, "memory-side link failed");
            }
        }
        tracing::debug!(task = %task.id, memory = %memory.id, "linked");
        true
    }
}

// =============================================================================
// Keyword extraction and scoring
// =============================================================================

fn task_keywords(task: &Task) -> HashSet<String> {
    let mut words = keywords_of(&task.title);
    for tag in &task.tags {
        words.extend(keywords_of(tag));
    }
    words
}

fn memory_keywords(memory: &MemoryDocument) -> HashSet<String> {
    // The body's opening line usually names the subject; the whole body
    // would drown the title signal.
    let head: String = memory.content.chars().take(200).collect();
    let mut words = keywords_of(&head);
    for tag in &memory.tags {
        words.extend(keywords_of(tag));
    }
    words
}

fn keywords_of(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|word| word.len() >= 3 && !STOPWORDS.contains(&word.as_str()))
        .collect()
}

fn overlap_score(
    a: &HashSet<String>,
    b: &HashSet<String>,
    project_a: Option<&str>,
    project_b: Option<&str>,
) -> usize {
    let shared = a.intersection(b).count();
    let project_bonus = match (project_a, project_b) {
        (Some(a), Some(b)) if !a.is_empty() && a == b => PROJECT_WEIGHT,
        _ => 0,
    };
    shared + project_bonus
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::broadcast::ChangeBroadcaster;
    use crate::index::TaskIndex;
    use crate::memory::store::PutMemory;
    use crate::task::store::NewTask;

    async fn setup() -> (TempDir, Arc<TaskStore>, Arc<MemoryStore>, TaskMemoryLinker) {
        let dir = TempDir::new().expect("tempdir");
        let bus = ChangeBroadcaster::new(64);
        let index = Arc::new(TaskIndex::in_memory().await.expect("index"));
        let tasks = Arc::new(TaskStore::new(dir.path().join("tasks"), index, bus.clone()));
        let memories = Arc::new(MemoryStore::new(dir.path().join("memories"), bus));
        let linker = TaskMemoryLinker::new(Arc::clone(&tasks), Arc::clone(&memories));
        (dir, tasks, memories, linker)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overlapping_memory_links_to_recent_task() {
        let (_dir, tasks, memories, linker) = setup().await;
        let task = tasks
            .create(NewTask {
                title: "Refactor sqlite indexer batching".to_string(),
                project: Some("recall".to_string()),
                tags: vec!["storage".to_string()],
                ..Default::default()
            })
            .await
            .expect("create task");

        let memory = memories
            .put(PutMemory {
                content: "Notes about the sqlite indexer and its batching strategy".to_string(),
                project: Some("recall".to_string()),
                ..Default::default()
            })
            .await
            .expect("put memory");

        let linked = linker.link_memory(&memory).await.expect("link");
        assert_eq!(linked, vec![task.id.clone()]);

        // Task side carries the memory id.
        let task = tasks.get(&task.id).await.expect("get");
        assert_eq!(task.memory_connections, vec![memory.id.clone()]);

        // Memory side carries the tag hint.
        let memory = memories.get(&memory.id).await.expect("get");
        assert!(
            memory
                .tags
                .iter()
                .any(|tag| tag == &format!("task:{}", short_id(&task.id)))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unrelated_items_stay_unlinked() {
        let (_dir, tasks, memories, linker) = setup().await;
        tasks
            .create(NewTask {
                title: "Paint the bikeshed".to_string(),
                project: Some("chores".to_string()),
                ..Default::default()
            })
            .await
            .expect("create task");

        let memory = memories
            .put(PutMemory {
                content: "Completely different topic entirely".to_string(),
                project: Some("elsewhere".to_string()),
                ..Default::default()
            })
            .await
            .expect("put memory");

        let linked = linker.link_memory(&memory).await.expect("link");
        assert!(linked.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn linking_twice_is_idempotent() {
        let (_dir, tasks, memories, linker) = setup().await;
        let task = tasks
            .create(NewTask {
                title: "Watcher debounce window tuning".to_string(),
                project: Some("recall".to_string()),
                ..Default::default()
            })
            .await
            .expect("create task");

        let memory = memories
            .put(PutMemory {
                content: "The watcher debounce window interacts with stability".to_string(),
                project: Some("recall".to_string()),
                ..Default::default()
            })
            .await
            .expect("put memory");

        let first = linker.link_memory(&memory).await.expect("link");
        assert_eq!(first.len(), 1);

        // Re-run with the refreshed documents: nothing new happens.
        let memory = memories.get(&memory.id).await.expect("get");
        let second = linker.link_memory(&memory).await.expect("relink");
        assert!(second.is_empty());

        let task = tasks.get(&task.id).await.expect("get");
        assert_eq!(task.memory_connections.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn task_side_scan_finds_existing_memories() {
        let (_dir, tasks, memories, linker) = setup().await;
        let memory = memories
            .put(PutMemory {
                content: "Decisions about migration rollback manifests".to_string(),
                project: Some("recall".to_string()),
                ..Default::default()
            })
            .await
            .expect("put memory");

        let task = tasks
            .create(NewTask {
                title: "Implement migration rollback from manifests".to_string(),
                project: Some("recall".to_string()),
                ..Default::default()
            })
            .await
            .expect("create task");

        let linked = linker.link_task(&task).await.expect("link");
        assert_eq!(linked, vec![memory.id]);
    }

    #[test]
    fn keyword_extraction_drops_stopwords_and_short_words() {
        let words = keywords_of("The indexer and the batching of it");
        assert!(words.contains("indexer"));
        assert!(words.contains("batching"));
        assert!(!words.contains("the"));
        assert!(!words.contains("it"));
        assert!(!words.contains("of"));
    }
}
