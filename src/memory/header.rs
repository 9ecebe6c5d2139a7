//! Header codec for the on-disk document format.
//!
//! A document is a UTF-8 file whose first region is a header delimited by
//! two `---` sentinel lines, followed by the body verbatim. The header is
//! line-oriented `key: value` YAML: ordered sequences in flow style,
//! a nested `metadata:` block with two-space indentation.
//!
//! Parsing is driven by a field table rather than ad-hoc string handling:
//! recognized keys are extracted by name, everything else is kept, in file
//! order, as an unknown-key tail that the writer emits back unchanged.

use miette::Diagnostic;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use super::document::MemoryDocument;

/// Errors raised while reading a document header.
#[derive(Error, Diagnostic, Debug)]
pub enum HeaderError {
    #[error("missing '---' header sentinel")]
    #[diagnostic(code(recall::header::missing_sentinel))]
    MissingSentinel,

    #[error("header is not a key/value mapping")]
    #[diagnostic(code(recall::header::not_a_mapping))]
    NotAMapping,

    #[error("invalid header YAML: {0}")]
    #[diagnostic(code(recall::header::yaml))]
    Yaml(String),

    #[error("missing required field '{0}'")]
    #[diagnostic(code(recall::header::missing_field))]
    MissingField(&'static str),
}

/// Memory header keys this version understands, in canonical write order.
const MEMORY_FIELDS: &[&str] = &[
    "id",
    "timestamp",
    "complexity",
    "category",
    "project",
    "tags",
    "priority",
    "status",
    "related_memories",
    "access_count",
    "last_accessed",
    "metadata",
];

// =============================================================================
// Envelope
// =============================================================================

/// Split a raw document into its header text and body.
///
/// The body is returned exactly as stored, byte for byte.
pub(crate) fn split_envelope(raw: &str) -> Result<(&str, &str), HeaderError> {
    let after_open = raw
        .strip_prefix("---\r\n")
        .or_else(|| raw.strip_prefix("---\n"))
        .ok_or(HeaderError::MissingSentinel)?;

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let header = &after_open[..offset];
            let body = &after_open[offset + line.len()..];
            return Ok((header, body));
        }
        offset += line.len();
    }
    Err(HeaderError::MissingSentinel)
}

/// Parse header text into an order-preserving mapping.
pub(crate) fn parse_mapping(header: &str) -> Result<Mapping, HeaderError> {
    if header.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value: Value =
        serde_yaml::from_str(header).map_err(|e| HeaderError::Yaml(e.to_string()))?;
    match value {
        Value::Mapping(map) => Ok(map),
        _ => Err(HeaderError::NotAMapping),
    }
}

// =============================================================================
// Typed extraction
// =============================================================================

pub(crate) fn get_str(map: &Mapping, key: &str) -> Option<String> {
    scalar_to_string(map.get(Value::from(key))?)
}

pub(crate) fn get_u64(map: &Mapping, key: &str) -> Option<u64> {
    match map.get(Value::from(key))? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn get_bool(map: &Mapping, key: &str) -> Option<bool> {
    match map.get(Value::from(key))? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn get_str_seq(map: &Mapping, key: &str) -> Option<Vec<String>> {
    match map.get(Value::from(key))? {
        Value::Sequence(seq) => Some(seq.iter().filter_map(scalar_to_string).collect()),
        // A bare scalar is tolerated as a one-element sequence.
        other => scalar_to_string(other).map(|s| vec![s]),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// =============================================================================
// Memory parse / write
// =============================================================================

/// Parse a memory document. Missing optional fields get their documented
/// defaults; unrecognized keys are preserved in order.
pub fn parse_memory(raw: &str) -> Result<MemoryDocument, HeaderError> {
    let (header, body) = split_envelope(raw)?;
    let map = parse_mapping(header)?;

    let id = get_str(&map, "id").ok_or(HeaderError::MissingField("id"))?;
    let timestamp = get_str(&map, "timestamp").ok_or(HeaderError::MissingField("timestamp"))?;

    let mut doc = MemoryDocument::new(id, timestamp, body.to_string());
    doc.complexity = get_u64(&map, "complexity")
        .map(|n| n.clamp(1, 4) as u8)
        .unwrap_or(1);
    doc.category = get_str(&map, "category").map(|s| s.parse().expect("infallible"));
    doc.project = get_str(&map, "project");
    doc.tags = get_str_seq(&map, "tags").unwrap_or_default();
    doc.priority = get_str(&map, "priority")
        .map(|s| s.parse().expect("infallible"))
        .unwrap_or_default();
    doc.status = get_str(&map, "status")
        .map(|s| s.parse().expect("infallible"))
        .unwrap_or_default();
    doc.related_memories = get_str_seq(&map, "related_memories").unwrap_or_default();
    doc.access_count = get_u64(&map, "access_count").unwrap_or(0);
    doc.last_accessed = get_str(&map, "last_accessed");

    if let Some(Value::Mapping(meta)) = map.get(Value::from("metadata")) {
        doc.content_type = get_str(meta, "content_type")
            .map(|s| s.parse().expect("infallible"))
            .unwrap_or_default();
        doc.language = get_str(meta, "language");
        doc.size = get_u64(meta, "size");
        doc.mermaid_diagram = get_bool(meta, "mermaid_diagram");
    }

    doc.unknown_fields = map
        .into_iter()
        .filter_map(|(key, value)| match key {
            Value::String(name) if !MEMORY_FIELDS.contains(&name.as_str()) => Some((name, value)),
            _ => None,
        })
        .collect();

    Ok(doc)
}

/// Serialize a memory document back to file form.
///
/// Known fields are written in table order, then the unknown tail in its
/// original order, then the `metadata` block. The body follows unchanged.
pub fn write_memory(doc: &MemoryDocument) -> String {
    let mut out = String::from("---\n");
    push_scalar(&mut out, "id", &doc.id);
    push_scalar(&mut out, "timestamp", &doc.timestamp);
    push_raw(&mut out, "complexity", &doc.complexity.to_string());
    if let Some(category) = doc.category {
        push_scalar(&mut out, "category", &category.to_string());
    }
    if let Some(project) = &doc.project {
        push_scalar(&mut out, "project", project);
    }
    push_seq(&mut out, "tags", &doc.tags);
    push_scalar(&mut out, "priority", &doc.priority.to_string());
    push_scalar(&mut out, "status", &doc.status.to_string());
    push_seq(&mut out, "related_memories", &doc.related_memories);
    push_raw(&mut out, "access_count", &doc.access_count.to_string());
    if let Some(last_accessed) = &doc.last_accessed {
        push_scalar(&mut out, "last_accessed", last_accessed);
    }
    for (key, value) in &doc.unknown_fields {
        push_yaml(&mut out, key, value);
    }
    out.push_str("metadata:\n");
    push_indented(&mut out, "content_type", &doc.content_type.to_string());
    if let Some(language) = &doc.language {
        push_indented(&mut out, "language", language);
    }
    if let Some(size) = doc.size {
        push_indented(&mut out, "size", &size.to_string());
    }
    if let Some(mermaid) = doc.mermaid_diagram {
        push_indented(&mut out, "mermaid_diagram", &mermaid.to_string());
    }
    out.push_str("---\n");
    out.push_str(&doc.content);
    out
}

// =============================================================================
// Writing primitives (shared with the task codec)
// =============================================================================

/// Whether a string survives as a plain YAML scalar.
fn needs_quoting(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    // Plain scalars must not look like another YAML type or carry syntax.
    let looks_typed = s.parse::<f64>().is_ok()
        || matches!(s, "true" | "false" | "null" | "~" | "yes" | "no" | "on" | "off");
    let has_syntax = s.contains(": ")
        || s.ends_with(':')
        || s.contains(" #")
        || s.contains(['\n', '\r', '\t', '"', '\'', '{', '}', '[', ']'])
        || s.starts_with([' ', '-', '?', '&', '*', '!', '|', '>', '%', '@', '`', '#'])
        || s.ends_with(' ');
    looks_typed || has_syntax
}

fn quote(s: &str) -> String {
    // JSON string quoting is valid YAML double-quoted style.
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

pub(crate) fn push_scalar(out: &mut String, key: &str, value: &str) {
    if needs_quoting(value) {
        out.push_str(&format!("{}: {}\n", key, quote(value)));
    } else {
        out.push_str(&format!("{}: {}\n", key, value));
    }
}

/// Write a value that is already valid YAML (numbers, booleans).
pub(crate) fn push_raw(out: &mut String, key: &str, value: &str) {
    out.push_str(&format!("{}: {}\n", key, value));
}

/// Write an ordered sequence in flow style: `key: [ "a", "b" ]`.
pub(crate) fn push_seq(out: &mut String, key: &str, values: &[String]) {
    if values.is_empty() {
        out.push_str(&format!("{}: []\n", key));
        return;
    }
    let items: Vec<String> = values.iter().map(|v| quote(v)).collect();
    out.push_str(&format!("{}: [ {} ]\n", key, items.join(", ")));
}

pub(crate) fn push_indented(out: &mut String, key: &str, value: &str) {
    out.push_str("  ");
    push_scalar(out, key, value);
}

/// Write an arbitrary preserved value under its original key.
pub(crate) fn push_yaml(out: &mut String, key: &str, value: &Value) {
    let mut single = Mapping::new();
    single.insert(Value::from(key), value.clone());
    match serde_yaml::to_string(&single) {
        Ok(rendered) => out.push_str(&rendered),
        Err(_) => push_scalar(out, key, &format!("{:?}", value)),
    }
}
