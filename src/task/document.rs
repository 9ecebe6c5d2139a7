//! Task file codec.
//!
//! Tasks use the same header+body envelope as memories. The body carries
//! the description followed by optional sections: `## Acceptance Criteria`
//! (checklist), `## Technical Requirements` (bullet list), `## Checklist`
//! (checklist items), and `## Context` (related files and docs). The
//! parser accepts sections in any order; the writer emits them in that
//! canonical order.

use serde_yaml::{Mapping, Value};

use crate::memory::header::{
    HeaderError, get_str, get_str_seq, get_u64, parse_mapping, push_raw, push_scalar, push_seq,
    push_yaml, split_envelope,
};

use super::model::{ChecklistItem, Task, TaskLevel, TaskStatus, path_depth};

/// Task header keys this version understands, in canonical write order.
const TASK_FIELDS: &[&str] = &[
    "id",
    "serial",
    "title",
    "level",
    "parent_id",
    "path",
    "path_order",
    "status",
    "project",
    "priority",
    "created_at",
    "updated_at",
    "due_date",
    "estimated_hours",
    "actual_hours",
    "completion_percentage",
    "assignee",
    "tags",
    "dependencies",
    "memory_connections",
    "metadata",
];

const SECTION_ACCEPTANCE: &str = "Acceptance Criteria";
const SECTION_REQUIREMENTS: &str = "Technical Requirements";
const SECTION_CHECKLIST: &str = "Checklist";
const SECTION_CONTEXT: &str = "Context";

// =============================================================================
// Parse
// =============================================================================

/// Parse a task file. `id` and `title` are required; everything else gets
/// defaults. Unknown header keys are preserved in order.
pub fn parse_task(raw: &str) -> Result<Task, HeaderError> {
    let (header, body) = split_envelope(raw)?;
    let map = parse_mapping(header)?;

    let id = get_str(&map, "id").ok_or(HeaderError::MissingField("id"))?;
    let title = get_str(&map, "title").ok_or(HeaderError::MissingField("title"))?;

    let path = get_str(&map, "path").unwrap_or_default();
    let level = match get_str(&map, "level") {
        Some(level) => level.parse().expect("infallible"),
        None if !path.is_empty() => TaskLevel::for_depth(path_depth(&path)),
        None => TaskLevel::default(),
    };
    let status: TaskStatus = get_str(&map, "status")
        .map(|s| s.parse().expect("infallible"))
        .unwrap_or_default();

    let mut task = Task {
        id,
        serial: get_u64(&map, "serial").unwrap_or(0),
        title,
        description: String::new(),
        level,
        parent_id: get_str(&map, "parent_id"),
        path,
        path_order: get_u64(&map, "path_order").unwrap_or(0) as u32,
        status,
        project: get_str(&map, "project").unwrap_or_default(),
        priority: get_str(&map, "priority")
            .map(|s| s.parse().expect("infallible"))
            .unwrap_or_default(),
        created_at: get_str(&map, "created_at").unwrap_or_default(),
        updated_at: get_str(&map, "updated_at").unwrap_or_default(),
        due_date: get_str(&map, "due_date"),
        estimated_hours: get_f64(&map, "estimated_hours"),
        actual_hours: get_f64(&map, "actual_hours"),
        completion_percentage: get_u64(&map, "completion_percentage").unwrap_or(0).min(100) as u8,
        assignee: get_str(&map, "assignee"),
        tags: get_str_seq(&map, "tags").unwrap_or_default(),
        dependencies: get_str_seq(&map, "dependencies").unwrap_or_default(),
        acceptance_criteria: Vec::new(),
        technical_requirements: Vec::new(),
        checklist: Vec::new(),
        context: Vec::new(),
        memory_connections: get_str_seq(&map, "memory_connections").unwrap_or_default(),
        metadata: get_metadata(&map),
        unknown_fields: Vec::new(),
    };

    task.unknown_fields = map
        .into_iter()
        .filter_map(|(key, value)| match key {
            Value::String(name) if !TASK_FIELDS.contains(&name.as_str()) => Some((name, value)),
            _ => None,
        })
        .collect();

    parse_body(body, &mut task);
    Ok(task)
}

fn get_f64(map: &Mapping, key: &str) -> Option<f64> {
    match map.get(Value::from(key))? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn get_metadata(map: &Mapping) -> serde_json::Map<String, serde_json::Value> {
    let mut out = serde_json::Map::new();
    if let Some(Value::Mapping(meta)) = map.get(Value::from("metadata")) {
        for (key, value) in meta {
            if let (Value::String(name), Some(json)) = (key, yaml_to_json(value)) {
                out.insert(name.clone(), json);
            }
        }
    }
    out
}

fn yaml_to_json(value: &Value) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

/// Split the body into the description and the known sections.
fn parse_body(body: &str, task: &mut Task) {
    let mut current: Option<&str> = None;
    let mut description = Vec::new();

    for line in body.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            let heading = heading.trim();
            current = match heading {
                SECTION_ACCEPTANCE | SECTION_REQUIREMENTS | SECTION_CHECKLIST
                | SECTION_CONTEXT => Some(heading),
                // Unrecognized headings fold back into the description.
                _ => None,
            };
            if current.is_some() {
                continue;
            }
        }
        match current {
            Some(SECTION_ACCEPTANCE) => {
                if let Some(item) = parse_checklist_line(line, task.acceptance_criteria.len()) {
                    task.acceptance_criteria.push(item);
                }
            }
            Some(SECTION_CHECKLIST) => {
                if let Some(item) = parse_checklist_line(line, task.checklist.len()) {
                    task.checklist.push(item);
                }
            }
            Some(SECTION_REQUIREMENTS) => {
                if let Some(text) = parse_bullet_line(line) {
                    task.technical_requirements.push(text);
                }
            }
            Some(SECTION_CONTEXT) => {
                if let Some(text) = parse_bullet_line(line) {
                    task.context.push(text);
                }
            }
            _ => description.push(line),
        }
    }

    task.description = description.join("\n").trim().to_string();
}

fn parse_checklist_line(line: &str, position: usize) -> Option<ChecklistItem> {
    let line = line.trim_start();
    let (completed, rest) = if let Some(rest) = line.strip_prefix("- [x] ") {
        (true, rest)
    } else if let Some(rest) = line.strip_prefix("- [X] ") {
        (true, rest)
    } else if let Some(rest) = line.strip_prefix("- [ ] ") {
        (false, rest)
    } else {
        return None;
    };
    Some(ChecklistItem {
        text: rest.trim_end().to_string(),
        completed,
        position: position as u32 + 1,
    })
}

fn parse_bullet_line(line: &str) -> Option<String> {
    let text = line.trim_start().strip_prefix("- ")?.trim_end();
    (!text.is_empty()).then(|| text.to_string())
}

// =============================================================================
// Write
// =============================================================================

/// Serialize a task to file form.
pub fn write_task(task: &Task) -> String {
    let mut out = String::from("---\n");
    push_scalar(&mut out, "id", &task.id);
    push_raw(&mut out, "serial", &task.serial.to_string());
    push_scalar(&mut out, "title", &task.title);
    push_scalar(&mut out, "level", &task.level.to_string());
    if let Some(parent_id) = &task.parent_id {
        push_scalar(&mut out, "parent_id", parent_id);
    }
    push_scalar(&mut out, "path", &task.path);
    push_raw(&mut out, "path_order", &task.path_order.to_string());
    push_scalar(&mut out, "status", &task.status.to_string());
    push_scalar(&mut out, "project", &task.project);
    push_scalar(&mut out, "priority", &task.priority.to_string());
    push_scalar(&mut out, "created_at", &task.created_at);
    push_scalar(&mut out, "updated_at", &task.updated_at);
    if let Some(due_date) = &task.due_date {
        push_scalar(&mut out, "due_date", due_date);
    }
    if let Some(estimated) = task.estimated_hours {
        push_raw(&mut out, "estimated_hours", &estimated.to_string());
    }
    if let Some(actual) = task.actual_hours {
        push_raw(&mut out, "actual_hours", &actual.to_string());
    }
    push_raw(
        &mut out,
        "completion_percentage",
        &task.completion_percentage.to_string(),
    );
    if let Some(assignee) = &task.assignee {
        push_scalar(&mut out, "assignee", assignee);
    }
    push_seq(&mut out, "tags", &task.tags);
    push_seq(&mut out, "dependencies", &task.dependencies);
    push_seq(&mut out, "memory_connections", &task.memory_connections);
    for (key, value) in &task.unknown_fields {
        push_yaml(&mut out, key, value);
    }
    if !task.metadata.is_empty() {
        out.push_str("metadata:\n");
        for (key, value) in &task.metadata {
            if let Ok(yaml) = serde_yaml::to_value(value) {
                let mut line = String::new();
                push_yaml(&mut line, key, &yaml);
                for rendered in line.lines() {
                    out.push_str("  ");
                    out.push_str(rendered);
                    out.push('\n');
                }
            }
        }
    }
    out.push_str("---\n");

    if !task.description.is_empty() {
        out.push_str(&task.description);
        out.push('\n');
    }
    push_checklist_section(&mut out, SECTION_ACCEPTANCE, &task.acceptance_criteria);
    push_bullet_section(&mut out, SECTION_REQUIREMENTS, &task.technical_requirements);
    push_checklist_section(&mut out, SECTION_CHECKLIST, &task.checklist);
    push_bullet_section(&mut out, SECTION_CONTEXT, &task.context);
    out
}

fn push_checklist_section(out: &mut String, title: &str, items: &[ChecklistItem]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {}\n\n", title));
    for item in items {
        let mark = if item.completed { "x" } else { " " };
        out.push_str(&format!("- [{}] {}\n", mark, item.text));
    }
}

fn push_bullet_section(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {}\n\n", title));
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
}
