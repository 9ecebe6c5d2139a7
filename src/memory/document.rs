//! Memory document model.
//!
//! Category, priority, status, and content-type are closed enums. Readers
//! map unrecognized values to an `Unknown` sentinel instead of failing, so
//! documents written by newer versions stay readable.

use serde::{Deserialize, Serialize};

/// Closed category set for memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Personal,
    Work,
    Code,
    Research,
    Conversations,
    Preferences,
    Unknown,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Personal => write!(f, "personal"),
            Category::Work => write!(f, "work"),
            Category::Code => write!(f, "code"),
            Category::Research => write!(f, "research"),
            Category::Conversations => write!(f, "conversations"),
            Category::Preferences => write!(f, "preferences"),
            Category::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "personal" => Category::Personal,
            "work" => Category::Work,
            "code" => Category::Code,
            "research" => Category::Research,
            "conversations" => Category::Conversations,
            "preferences" => Category::Preferences,
            _ => Category::Unknown,
        })
    }
}

/// Memory priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Unknown,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "low" => Priority::Low,
            "medium" => Priority::Medium,
            "high" => Priority::High,
            _ => Priority::Unknown,
        })
    }
}

/// Lifecycle status of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    #[default]
    Active,
    Archived,
    Reference,
    Unknown,
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryStatus::Active => write!(f, "active"),
            MemoryStatus::Archived => write!(f, "archived"),
            MemoryStatus::Reference => write!(f, "reference"),
            MemoryStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for MemoryStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "active" => MemoryStatus::Active,
            "archived" => MemoryStatus::Archived,
            "reference" => MemoryStatus::Reference,
            _ => MemoryStatus::Unknown,
        })
    }
}

/// Derived shape of a memory's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Code,
    Structured,
    Unknown,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Text => write!(f, "text"),
            ContentType::Code => write!(f, "code"),
            ContentType::Structured => write!(f, "structured"),
            ContentType::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "text" => ContentType::Text,
            "code" => ContentType::Code,
            "structured" => ContentType::Structured,
            _ => ContentType::Unknown,
        })
    }
}

/// One persisted memory.
///
/// `content` is the body below the header, byte-for-byte. Header fields a
/// file does not carry get the documented defaults on read. `unknown_fields`
/// keeps header keys this version does not recognize, in file order, so a
/// rewrite preserves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub id: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: MemoryStatus,
    #[serde(default)]
    pub related_memories: Vec<String>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Derived, 1..=4.
    pub complexity: u8,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mermaid_diagram: Option<bool>,
    pub content: String,
    #[serde(skip)]
    pub unknown_fields: Vec<(String, serde_yaml::Value)>,
}

impl MemoryDocument {
    /// A document with defaults for everything but id, timestamp, content.
    pub fn new(id: String, timestamp: String, content: String) -> Self {
        Self {
            id,
            timestamp,
            project: None,
            category: None,
            tags: Vec::new(),
            priority: Priority::Medium,
            status: MemoryStatus::Active,
            related_memories: Vec::new(),
            access_count: 0,
            last_accessed: None,
            language: None,
            complexity: 1,
            content_type: ContentType::Text,
            size: None,
            mermaid_diagram: None,
            content,
            unknown_fields: Vec::new(),
        }
    }
}
