//! Tests for the document header codec.

use serde_yaml::Value;

use crate::memory::document::{Category, ContentType, MemoryStatus, Priority};
use crate::memory::header::{parse_memory, split_envelope, write_memory};

const FULL_DOC: &str = "---\n\
id: 0123456789abcdef0123456789abcdef\n\
timestamp: \"2026-08-01T10:00:00Z\"\n\
complexity: 3\n\
category: code\n\
project: demo\n\
tags: [ \"rust\", \"storage\" ]\n\
priority: high\n\
status: active\n\
related_memories: [ \"fedcba98\" ]\n\
access_count: 2\n\
last_accessed: \"2026-08-01T11:00:00Z\"\n\
metadata:\n\
  content_type: code\n\
  language: rust\n\
  size: 24\n\
---\nfn main() { let x = 1; }";

#[test]
fn full_header_parses() {
    let doc = parse_memory(FULL_DOC).expect("parse");
    assert_eq!(doc.id, "0123456789abcdef0123456789abcdef");
    assert_eq!(doc.timestamp, "2026-08-01T10:00:00Z");
    assert_eq!(doc.complexity, 3);
    assert_eq!(doc.category, Some(Category::Code));
    assert_eq!(doc.project.as_deref(), Some("demo"));
    assert_eq!(doc.tags, vec!["rust", "storage"]);
    assert_eq!(doc.priority, Priority::High);
    assert_eq!(doc.status, MemoryStatus::Active);
    assert_eq!(doc.related_memories, vec!["fedcba98"]);
    assert_eq!(doc.access_count, 2);
    assert_eq!(doc.content_type, ContentType::Code);
    assert_eq!(doc.language.as_deref(), Some("rust"));
    assert_eq!(doc.size, Some(24));
    assert_eq!(doc.content, "fn main() { let x = 1; }");
}

#[test]
fn missing_optional_fields_get_defaults() {
    let raw = "---\nid: abc\ntimestamp: \"2026-08-01T10:00:00Z\"\n---\nbody";
    let doc = parse_memory(raw).expect("parse");
    assert_eq!(doc.complexity, 1);
    assert_eq!(doc.priority, Priority::Medium);
    assert_eq!(doc.status, MemoryStatus::Active);
    assert_eq!(doc.access_count, 0);
    assert!(doc.tags.is_empty());
    assert!(doc.related_memories.is_empty());
}

#[test]
fn missing_id_is_rejected() {
    let raw = "---\ntimestamp: \"2026-08-01T10:00:00Z\"\n---\nbody";
    assert!(parse_memory(raw).is_err());
}

#[test]
fn missing_sentinel_is_rejected() {
    assert!(parse_memory("id: abc\n").is_err());
    assert!(parse_memory("---\nid: abc\nno closing sentinel").is_err());
}

#[test]
fn unknown_enum_values_map_to_sentinel() {
    let raw = "---\n\
id: abc\n\
timestamp: \"2026-08-01T10:00:00Z\"\n\
category: daydreams\n\
priority: urgent\n\
status: paused\n\
---\n";
    let doc = parse_memory(raw).expect("parse");
    assert_eq!(doc.category, Some(Category::Unknown));
    assert_eq!(doc.priority, Priority::Unknown);
    assert_eq!(doc.status, MemoryStatus::Unknown);
}

#[test]
fn unknown_keys_survive_round_trip() {
    let raw = "---\n\
id: abc\n\
timestamp: \"2026-08-01T10:00:00Z\"\n\
x_custom: some value\n\
x_flag: true\n\
---\nbody text\n";
    let doc = parse_memory(raw).expect("parse");
    assert_eq!(doc.unknown_fields.len(), 2);
    assert_eq!(doc.unknown_fields[0].0, "x_custom");
    assert_eq!(doc.unknown_fields[1].0, "x_flag");

    let rewritten = write_memory(&doc);
    let reparsed = parse_memory(&rewritten).expect("reparse");
    assert_eq!(reparsed.unknown_fields, doc.unknown_fields);
    assert_eq!(reparsed.content, doc.content);
}

#[test]
fn write_then_parse_is_identity_on_the_logical_record() {
    let doc = parse_memory(FULL_DOC).expect("parse");
    let rewritten = write_memory(&doc);
    let reparsed = parse_memory(&rewritten).expect("reparse");
    assert_eq!(reparsed, doc);
}

#[test]
fn body_bytes_are_verbatim() {
    let raw = "---\nid: abc\ntimestamp: \"2026-08-01T10:00:00Z\"\n---\n\
line one\n\n   indented\ttabbed\ntrailing spaces   \n";
    let doc = parse_memory(raw).expect("parse");
    assert_eq!(doc.content, "line one\n\n   indented\ttabbed\ntrailing spaces   \n");
    let reparsed = parse_memory(&write_memory(&doc)).expect("reparse");
    assert_eq!(reparsed.content, doc.content);
}

#[test]
fn body_may_contain_sentinel_lines() {
    let raw = "---\nid: abc\ntimestamp: \"2026-08-01T10:00:00Z\"\n---\nabove\n---\nbelow\n";
    let doc = parse_memory(raw).expect("parse");
    assert_eq!(doc.content, "above\n---\nbelow\n");
}

#[test]
fn values_needing_quotes_round_trip() {
    let mut doc = parse_memory(FULL_DOC).expect("parse");
    doc.project = Some("a: tricky {value}".to_string());
    doc.tags = vec!["plain".to_string(), "with space".to_string(), "123".to_string()];
    let reparsed = parse_memory(&write_memory(&doc)).expect("reparse");
    assert_eq!(reparsed.project, doc.project);
    assert_eq!(reparsed.tags, doc.tags);
}

#[test]
fn unknown_sequence_values_are_preserved() {
    let raw = "---\n\
id: abc\n\
timestamp: \"2026-08-01T10:00:00Z\"\n\
x_list:\n\
- one\n\
- two\n\
---\n";
    let doc = parse_memory(raw).expect("parse");
    let reparsed = parse_memory(&write_memory(&doc)).expect("reparse");
    assert_eq!(reparsed.unknown_fields, doc.unknown_fields);
    match &reparsed.unknown_fields[0].1 {
        Value::Sequence(seq) => assert_eq!(seq.len(), 2),
        other => panic!("expected sequence, got {:?}", other),
    }
}

#[test]
fn envelope_split_keeps_header_and_body_separate() {
    let (header, body) = split_envelope("---\nkey: 1\n---\nrest").expect("split");
    assert_eq!(header, "key: 1\n");
    assert_eq!(body, "rest");
}

#[test]
fn empty_body_is_allowed() {
    let (_, body) = split_envelope("---\nkey: 1\n---\n").expect("split");
    assert_eq!(body, "");
}
