//! Tests for materialized-path helpers and level mapping.

use crate::task::model::{TaskLevel, TaskStatus, child_path, path_depth, zeropad};

#[test]
fn zeropad_is_three_digits() {
    assert_eq!(zeropad(1), "001");
    assert_eq!(zeropad(42), "042");
    assert_eq!(zeropad(999), "999");
    assert_eq!(zeropad(1000), "1000"); // never truncated
}

#[test]
fn path_depth_counts_segments() {
    assert_eq!(path_depth(""), 0);
    assert_eq!(path_depth("001"), 1);
    assert_eq!(path_depth("001.003.002"), 3);
}

#[test]
fn child_path_appends_zero_padded_ordinal() {
    assert_eq!(child_path(None, 1), "001");
    assert_eq!(child_path(Some("001"), 3), "001.003");
    assert_eq!(child_path(Some("001.003"), 2), "001.003.002");
}

#[test]
fn level_follows_depth() {
    assert_eq!(TaskLevel::for_depth(1), TaskLevel::Master);
    assert_eq!(TaskLevel::for_depth(2), TaskLevel::Epic);
    assert_eq!(TaskLevel::for_depth(3), TaskLevel::Task);
    assert_eq!(TaskLevel::for_depth(4), TaskLevel::Subtask);
}

#[test]
fn semantic_labels_match_levels() {
    assert_eq!(TaskLevel::Master.semantic_label(), "PROJECT");
    assert_eq!(TaskLevel::Epic.semantic_label(), "STAGE");
    assert_eq!(TaskLevel::Task.semantic_label(), "TASK");
    assert_eq!(TaskLevel::Subtask.semantic_label(), "SUB");
}

#[test]
fn unknown_level_and_status_are_sentinels() {
    let level: TaskLevel = "milestone".parse().expect("infallible");
    assert_eq!(level, TaskLevel::Unknown);
    let status: TaskStatus = "paused".parse().expect("infallible");
    assert_eq!(status, TaskStatus::Unknown);
}

#[test]
fn status_implies_initial_completion() {
    assert_eq!(TaskStatus::Done.initial_completion(), 100);
    assert_eq!(TaskStatus::InProgress.initial_completion(), 25);
    assert_eq!(TaskStatus::Todo.initial_completion(), 0);
    assert_eq!(TaskStatus::Blocked.initial_completion(), 0);
}
