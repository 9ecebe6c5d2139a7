//! Wire contract for dashboard consumers.
//!
//! Frames are line-delimited JSON over a bidirectional stream. The servers
//! carrying the stream live outside this crate; the frame shapes defined
//! here are the contract they relay. A frame that fails to parse is
//! grounds for closing the connection.

use serde::{Deserialize, Serialize};

use crate::broadcast::{ChangeAction, ChangeEvent};
use crate::util::now_rfc3339;

/// Server-to-client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    FileChange { data: FileChangeData },
    TaskChange { data: TaskChangeData },
    MemoryChange { data: MemoryChangeData },
    Automation {
        event: String,
        data: serde_json::Value,
        timestamp: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChangeData {
    pub action: ChangeAction,
    pub file: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskChangeData {
    pub action: ChangeAction,
    pub task: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryChangeData {
    pub action: ChangeAction,
    pub memory: String,
    pub timestamp: String,
}

impl Frame {
    /// Map a broadcast event onto its wire frame.
    pub fn from_event(event: &ChangeEvent) -> Self {
        match event {
            ChangeEvent::Task {
                action,
                id,
                timestamp,
                ..
            } => Frame::TaskChange {
                data: TaskChangeData {
                    action: *action,
                    task: id.clone(),
                    timestamp: timestamp.clone(),
                },
            },
            ChangeEvent::Memory {
                action,
                id,
                timestamp,
                ..
            } => Frame::MemoryChange {
                data: MemoryChangeData {
                    action: *action,
                    memory: id.clone(),
                    timestamp: timestamp.clone(),
                },
            },
            ChangeEvent::File {
                action,
                path,
                timestamp,
                ..
            } => Frame::FileChange {
                data: FileChangeData {
                    action: *action,
                    file: path.display().to_string(),
                    timestamp: timestamp.clone(),
                },
            },
        }
    }

    pub fn automation(event: impl Into<String>, data: serde_json::Value) -> Self {
        Frame::Automation {
            event: event.into(),
            data,
            timestamp: now_rfc3339(),
        }
    }

    /// Encode as one newline-terminated JSON line.
    pub fn encode_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one frame from a line. Any parse failure means the peer is
    /// misbehaving and the connection should be closed.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_change_frame_shape_matches_contract() {
        let event = ChangeEvent::task(ChangeAction::Added, "0f3a", None);
        let frame = Frame::from_event(&event);
        let json: serde_json::Value =
            serde_json::from_str(&frame.encode_line().expect("encode")).expect("valid json");

        assert_eq!(json["type"], "task_change");
        assert_eq!(json["data"]["action"], "add");
        assert_eq!(json["data"]["task"], "0f3a");
        assert!(json["data"]["timestamp"].is_string());
    }

    #[test]
    fn automation_frame_keeps_payload_at_top_level() {
        let frame = Frame::automation("status_changed", serde_json::json!({"task": "t1"}));
        let json: serde_json::Value =
            serde_json::from_str(&frame.encode_line().expect("encode")).expect("valid json");

        assert_eq!(json["type"], "automation");
        assert_eq!(json["event"], "status_changed");
        assert_eq!(json["data"]["task"], "t1");
    }

    #[test]
    fn frames_round_trip_through_lines() {
        let frame = Frame::from_event(&ChangeEvent::file(
            ChangeAction::Removed,
            "/t/demo/task-1.md",
            "/t",
        ));
        let line = frame.encode_line().expect("encode");
        let parsed = Frame::parse_line(&line).expect("parse");
        assert_eq!(parsed, frame);
    }

    #[test]
    fn malformed_line_is_rejected() {
        assert!(Frame::parse_line("{\"type\": \"task_change\"").is_err());
        assert!(Frame::parse_line("not json").is_err());
    }
}
