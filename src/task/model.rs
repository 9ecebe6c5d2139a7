//! Task domain model.

use serde::{Deserialize, Serialize};

pub use crate::memory::document::Priority;

/// Maximum hierarchy depth: master, epic, task, subtask.
pub const MAX_DEPTH: usize = 4;

/// Hierarchy level of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskLevel {
    Master,
    Epic,
    #[default]
    Task,
    Subtask,
    Unknown,
}

impl TaskLevel {
    /// Level at a given 1-based hierarchy depth.
    pub fn for_depth(depth: usize) -> Self {
        match depth {
            1 => TaskLevel::Master,
            2 => TaskLevel::Epic,
            3 => TaskLevel::Task,
            _ => TaskLevel::Subtask,
        }
    }

    /// Directory label used in semantic paths.
    pub fn semantic_label(&self) -> &'static str {
        match self {
            TaskLevel::Master => "PROJECT",
            TaskLevel::Epic => "STAGE",
            TaskLevel::Task => "TASK",
            TaskLevel::Subtask | TaskLevel::Unknown => "SUB",
        }
    }
}

impl std::fmt::Display for TaskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskLevel::Master => write!(f, "master"),
            TaskLevel::Epic => write!(f, "epic"),
            TaskLevel::Task => write!(f, "task"),
            TaskLevel::Subtask => write!(f, "subtask"),
            TaskLevel::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for TaskLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "master" => TaskLevel::Master,
            "epic" => TaskLevel::Epic,
            "task" => TaskLevel::Task,
            "subtask" => TaskLevel::Subtask,
            _ => TaskLevel::Unknown,
        })
    }
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Blocked,
    Unknown,
}

impl TaskStatus {
    /// Initial completion percentage implied by a status.
    pub fn initial_completion(&self) -> u8 {
        match self {
            TaskStatus::Done => 100,
            TaskStatus::InProgress => 25,
            _ => 0,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "todo" => TaskStatus::Todo,
            "in_progress" => TaskStatus::InProgress,
            "done" => TaskStatus::Done,
            "blocked" => TaskStatus::Blocked,
            _ => TaskStatus::Unknown,
        })
    }
}

/// One checklist entry, ordered by `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    pub completed: bool,
    pub position: u32,
}

/// A task-to-task dependency edge as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub task_id: String,
    pub depends_on_task_id: String,
    pub kind: String,
    pub created_at: String,
}

impl DependencyEdge {
    pub const DEFAULT_KIND: &'static str = "finish-to-start";
}

/// Append-only activity record for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub task_id: String,
    pub action: String,
    pub detail: serde_json::Value,
    pub timestamp: String,
    pub actor: String,
}

/// One work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Human-friendly serial number, rendered as `T-<n>`.
    pub serial: u64,
    pub title: String,
    pub description: String,
    pub level: TaskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Materialized path of zero-padded ordinals, e.g. `001.003.002`.
    pub path: String,
    /// Ordinal among siblings, 1-based.
    pub path_order: u32,
    pub status: TaskStatus,
    pub project: String,
    pub priority: Priority,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<f64>,
    /// 0..=100.
    pub completion_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ids of tasks this task depends on. Cycles are allowed here; only
    /// parent edges are cycle-checked.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<ChecklistItem>,
    #[serde(default)]
    pub technical_requirements: Vec<String>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub context: Vec<String>,
    /// Linked memory ids.
    #[serde(default)]
    pub memory_connections: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Header keys this version does not recognize, kept for round-trip.
    #[serde(skip)]
    pub unknown_fields: Vec<(String, serde_yaml::Value)>,
}

impl Task {
    /// Hierarchy depth, 1-based (a root has depth 1).
    pub fn depth(&self) -> usize {
        path_depth(&self.path)
    }

    /// `T-<n>` serial label.
    pub fn serial_label(&self) -> String {
        format!("T-{}", self.serial)
    }
}

/// A task with its children, as returned by tree queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskTreeNode {
    #[serde(flatten)]
    pub task: Task,
    pub children: Vec<TaskTreeNode>,
}

// =============================================================================
// Materialized-path helpers
// =============================================================================

/// Zero-pad an ordinal to three digits.
pub fn zeropad(ordinal: u32) -> String {
    format!("{:03}", ordinal)
}

/// Number of segments in a materialized path.
pub fn path_depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split('.').count()
    }
}

/// Child path under an optional parent path.
pub fn child_path(parent_path: Option<&str>, ordinal: u32) -> String {
    match parent_path {
        Some(parent) => format!("{}.{}", parent, zeropad(ordinal)),
        None => zeropad(ordinal),
    }
}
