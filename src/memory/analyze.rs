//! Content derivations: complexity level and content-type.
//!
//! Both are computed at write time when the caller does not supply them,
//! from the body and the structured fields already on the document.

use super::document::{ContentType, MemoryDocument};

/// Fence languages that mark a body as a diagram.
const DIAGRAM_FENCES: &[&str] = &["mermaid", "graph", "flowchart", "sequenceDiagram", "gantt"];

/// Keywords that mark a body as code even without a fence.
const CODE_KEYWORDS: &[&str] = &[
    "function ",
    "class ",
    "import ",
    "export ",
    "def ",
    "fn ",
    "SELECT ",
    "INSERT ",
    "const ",
    "#include",
];

/// Fence languages that mark a body as structured data.
const STRUCTURED_FENCES: &[&str] = &["json", "yaml", "yml", "toml"];

/// Complexity level 1..=4.
///
/// Starts at 1 and earns a point per band: categorization (category set or
/// three-plus tags), connectivity (project set or any related memory), and
/// content weight (long body, five-plus tags, a diagram fence, or
/// three-plus related memories).
pub fn complexity_of(doc: &MemoryDocument) -> u8 {
    let mut level = 1u8;
    if doc.category.is_some() || doc.tags.len() >= 3 {
        level += 1;
    }
    if doc.project.is_some() || !doc.related_memories.is_empty() {
        level += 1;
    }
    if doc.content.len() > 1000
        || doc.tags.len() >= 5
        || has_diagram_fence(&doc.content)
        || doc.related_memories.len() >= 3
    {
        level += 1;
    }
    level.clamp(1, 4)
}

/// Classify a body as text, code, or structured.
pub fn content_type_of(body: &str) -> ContentType {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return ContentType::Structured;
    }
    if has_fence_in(body, STRUCTURED_FENCES) || has_diagram_fence(body) {
        return ContentType::Structured;
    }
    if body.contains("```") || CODE_KEYWORDS.iter().any(|kw| body.contains(kw)) {
        return ContentType::Code;
    }
    ContentType::Text
}

/// Whether the body opens a recognized diagram fence.
pub fn has_diagram_fence(body: &str) -> bool {
    has_fence_in(body, DIAGRAM_FENCES)
}

fn has_fence_in(body: &str, languages: &[&str]) -> bool {
    body.lines().any(|line| {
        let line = line.trim_start();
        line.strip_prefix("```")
            .map(str::trim)
            .is_some_and(|lang| languages.contains(&lang))
    })
}
