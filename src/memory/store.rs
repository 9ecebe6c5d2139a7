//! File-backed memory store.
//!
//! Files are the source of truth. Every operation reads from and writes to
//! disk directly; queries re-read files so external edits are always
//! visible. Writes go through a temp-file rename so a crash never leaves a
//! half-written document behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::broadcast::{ChangeAction, ChangeBroadcaster, ChangeEvent};
use crate::error::{StoreError, StoreResult};
use crate::util::{generate_id, now_rfc3339};

use super::analyze::{complexity_of, content_type_of, has_diagram_fence};
use super::document::{Category, MemoryDocument, MemoryStatus, Priority};
use super::header::{parse_memory, write_memory};

/// Longest accepted project directory component.
const PROJECT_MAX_LEN: usize = 50;

/// Longest slug taken from the content for the file name.
const SLUG_MAX_LEN: usize = 30;

/// Inputs for creating a memory.
#[derive(Debug, Default, Clone)]
pub struct PutMemory {
    pub content: String,
    pub project: Option<String>,
    pub category: Option<Category>,
    pub tags: Vec<String>,
    pub priority: Option<Priority>,
    pub status: Option<MemoryStatus>,
    pub related_memories: Vec<String>,
    pub language: Option<String>,
}

/// Field updates for an existing memory. `None` leaves a field unchanged.
#[derive(Debug, Default, Clone)]
pub struct MemoryUpdate {
    pub content: Option<String>,
    pub project: Option<String>,
    pub category: Option<Category>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<Priority>,
    pub status: Option<MemoryStatus>,
    pub related_memories: Option<Vec<String>>,
    pub language: Option<String>,
}

/// Memory document store rooted at one directory.
pub struct MemoryStore {
    root: PathBuf,
    broadcaster: ChangeBroadcaster,
}

impl MemoryStore {
    pub fn new(root: impl Into<PathBuf>, broadcaster: ChangeBroadcaster) -> Self {
        Self {
            root: root.into(),
            broadcaster,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a memory and persist it under its project directory.
    pub async fn put(&self, input: PutMemory) -> StoreResult<MemoryDocument> {
        let id = generate_id();
        let timestamp = now_rfc3339();

        let mut doc = MemoryDocument::new(id.clone(), timestamp, input.content);
        doc.project = input.project.as_deref().map(sanitize_project);
        doc.category = input.category;
        doc.tags = input.tags;
        doc.priority = input.priority.unwrap_or_default();
        doc.status = input.status.unwrap_or_default();
        doc.related_memories = input.related_memories;
        doc.language = input.language;
        derive_fields(&mut doc);

        let path = self.document_path(&doc)?;
        let dir = path.parent().expect("document path has a parent");
        std::fs::create_dir_all(dir)
            .map_err(|e| StoreError::io(format!("create {}", dir.display()), e))?;
        write_atomic(&path, &write_memory(&doc))?;

        tracing::info!(id = %doc.id, path = %path.display(), "memory created");
        self.broadcaster.publish(ChangeEvent::memory(
            ChangeAction::Added,
            &doc.id,
            doc.project.clone(),
        ));
        Ok(doc)
    }

    /// Fetch a memory by id, bumping its access statistics.
    ///
    /// The access bump rewrites the file best-effort; a failed bump does
    /// not fail the read.
    pub async fn get(&self, id: &str) -> StoreResult<MemoryDocument> {
        let (path, mut doc) = self.find(id)?;
        doc.access_count += 1;
        doc.last_accessed = Some(now_rfc3339());
        if let Err(err) = write_atomic(&path, &write_memory(&doc)) {
            tracing::debug!(id, error = %err, "access-count bump failed");
        }
        Ok(doc)
    }

    /// List memories, optionally scoped to one project, newest first.
    pub async fn list(
        &self,
        project: Option<&str>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<MemoryDocument>> {
        let mut docs: Vec<MemoryDocument> = self
            .scan(project)?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect();
        docs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    /// Rewrite a memory with the given field changes.
    ///
    /// The old file is removed and a fresh one written (the file name
    /// follows the content slug). If the new write fails the old file is
    /// restored, so the document never disappears.
    pub async fn update(&self, id: &str, update: MemoryUpdate) -> StoreResult<MemoryDocument> {
        let (old_path, mut doc) = self.find(id)?;
        let old_raw = write_memory(&doc);

        if let Some(content) = update.content {
            doc.content = content;
        }
        if let Some(project) = update.project {
            doc.project = Some(sanitize_project(&project));
        }
        if let Some(category) = update.category {
            doc.category = Some(category);
        }
        if let Some(tags) = update.tags {
            doc.tags = tags;
        }
        if let Some(priority) = update.priority {
            doc.priority = priority;
        }
        if let Some(status) = update.status {
            doc.status = status;
        }
        if let Some(related) = update.related_memories {
            doc.related_memories = related;
        }
        if let Some(language) = update.language {
            doc.language = Some(language);
        }
        derive_fields(&mut doc);

        let new_path = self.document_path(&doc)?;
        std::fs::remove_file(&old_path)
            .map_err(|e| StoreError::io(format!("remove {}", old_path.display()), e))?;

        let dir = new_path.parent().expect("document path has a parent");
        let written = std::fs::create_dir_all(dir)
            .map_err(|e| StoreError::io(format!("create {}", dir.display()), e))
            .and_then(|_| write_atomic(&new_path, &write_memory(&doc)));
        if let Err(err) = written {
            // Put the previous document back before surfacing the failure.
            if let Err(restore_err) = write_atomic(&old_path, &old_raw) {
                tracing::error!(id, error = %restore_err, "restore after failed update also failed");
            }
            return Err(err);
        }

        tracing::info!(id, path = %new_path.display(), "memory updated");
        self.broadcaster.publish(ChangeEvent::memory(
            ChangeAction::Changed,
            id,
            doc.project.clone(),
        ));
        Ok(doc)
    }

    /// Delete a memory. Returns `NotFound` once it is already gone.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let (path, doc) = self.find(id)?;
        std::fs::remove_file(&path)
            .map_err(|e| StoreError::io(format!("remove {}", path.display()), e))?;
        tracing::info!(id, path = %path.display(), "memory deleted");
        self.broadcaster
            .publish(ChangeEvent::memory(ChangeAction::Removed, id, doc.project));
        Ok(())
    }

    /// Case-insensitive substring search over body, tags, and category.
    /// Results are ordered newest first; no ranking beyond recency.
    pub async fn search(
        &self,
        query: &str,
        project: Option<&str>,
    ) -> StoreResult<Vec<MemoryDocument>> {
        let needle = query.to_lowercase();
        let mut hits: Vec<MemoryDocument> = self
            .scan(project)?
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| {
                doc.content.to_lowercase().contains(&needle)
                    || doc.tags.iter().any(|t| t.to_lowercase().contains(&needle))
                    || doc
                        .category
                        .is_some_and(|c| c.to_string().contains(&needle))
            })
            .collect();
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(hits)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Resolve the file path for a document and refuse anything that would
    /// land outside the root.
    fn document_path(&self, doc: &MemoryDocument) -> StoreResult<PathBuf> {
        let project = doc.project.as_deref().unwrap_or("default");
        let date = doc.timestamp.get(..10).unwrap_or("0000-00-00");
        let file = format!(
            "{}-{}-{}.md",
            date,
            content_slug(&doc.content),
            &doc.id[..doc.id.len().min(6)]
        );
        let path = self.root.join(project).join(file);
        if !path.starts_with(&self.root) {
            return Err(StoreError::PathEscape {
                path: path.display().to_string(),
            });
        }
        Ok(path)
    }

    fn find(&self, id: &str) -> StoreResult<(PathBuf, MemoryDocument)> {
        self.scan(None)?
            .into_iter()
            .find(|(_, doc)| doc.id == id)
            .ok_or_else(|| StoreError::not_found("memory", id))
    }

    /// Walk the root (or one project directory) and parse every document.
    /// Files that fail to parse are logged and skipped.
    fn scan(&self, project: Option<&str>) -> StoreResult<Vec<(PathBuf, MemoryDocument)>> {
        let mut docs = Vec::new();
        if !self.root.exists() {
            return Ok(docs);
        }
        let dirs: Vec<PathBuf> = match project {
            Some(project) => vec![self.root.join(sanitize_project(project))],
            None => read_dir_sorted(&self.root)?
                .into_iter()
                .filter(|p| p.is_dir())
                .collect(),
        };
        for dir in dirs {
            if !dir.exists() {
                continue;
            }
            for path in read_dir_sorted(&dir)? {
                if path.extension().is_none_or(|ext| ext != "md") {
                    continue;
                }
                let raw = match std::fs::read_to_string(&path) {
                    Ok(raw) => raw,
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "unreadable document skipped");
                        continue;
                    }
                };
                match parse_memory(&raw) {
                    Ok(doc) => docs.push((path, doc)),
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "unparseable document skipped");
                    }
                }
            }
        }
        Ok(docs)
    }
}

/// Apply the write-time derivations.
fn derive_fields(doc: &mut MemoryDocument) {
    doc.content_type = content_type_of(&doc.content);
    doc.complexity = complexity_of(doc);
    doc.size = Some(doc.content.len() as u64);
    doc.mermaid_diagram = has_diagram_fence(&doc.content).then_some(true);
}

/// Restrict a project name to `[A-Za-z0-9_-]`, at most 50 chars.
pub(crate) fn sanitize_project(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(PROJECT_MAX_LEN)
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

/// Slug from the first characters of the content.
fn content_slug(content: &str) -> String {
    let slug: String = content
        .chars()
        .take(SLUG_MAX_LEN)
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "memory".to_string()
    } else {
        slug
    }
}

/// Write via a temp file in the same directory, then rename into place.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> StoreResult<()> {
    let dir = path.parent().ok_or_else(|| StoreError::InvalidPath {
        path: path.display().to_string(),
        reason: "no parent directory".to_string(),
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| StoreError::io(format!("temp file in {}", dir.display()), e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| StoreError::io(format!("write {}", path.display()), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(format!("persist {}", path.display()), e.error))?;
    Ok(())
}

/// Directory entries in name order, for deterministic scans.
pub(crate) fn read_dir_sorted(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| StoreError::io(format!("read dir {}", dir.display()), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    Ok(entries)
}
