use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a remote task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
  Pending,
  InProgress,
  Succeeded,
  Failed,
  Canceled,
}

impl TaskStatus {
  /// Whether the remote backend will stop reporting progress for this task.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
    )
  }

  pub fn is_succeeded(self) -> bool {
    self == TaskStatus::Succeeded
  }

  /// Parse the status string reported by the remote backend.
  pub fn from_remote(status: &str) -> Option<Self> {
    match status.to_ascii_uppercase().as_str() {
      "PENDING" | "QUEUED" => Some(TaskStatus::Pending),
      "IN_PROGRESS" | "RUNNING" => Some(TaskStatus::InProgress),
      "SUCCEEDED" => Some(TaskStatus::Succeeded),
      "FAILED" | "EXPIRED" => Some(TaskStatus::Failed),
      "CANCELED" | "CANCELLED" => Some(TaskStatus::Canceled),
      _ => None,
    }
  }
}

impl std::fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      TaskStatus::Pending => "PENDING",
      TaskStatus::InProgress => "IN_PROGRESS",
      TaskStatus::Succeeded => "SUCCEEDED",
      TaskStatus::Failed => "FAILED",
      TaskStatus::Canceled => "CANCELED",
    };
    f.write_str(s)
  }
}

/// Persisted execution state of one task (or one forEach item).
///
/// Only short values belong here: scalars, URLs, relative file paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_id: Option<String>,
  pub status: TaskStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub outputs: BTreeMap<String, serde_json::Value>,
  /// Artifact name -> path relative to the asset directory.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub artifacts: BTreeMap<String, String>,
  /// forEach element this record belongs to.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub item: Option<String>,
  /// Numeric id of the forEach element, from the step's id lookup table.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub item_id: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl TaskState {
  /// A freshly submitted task.
  pub fn in_progress(task_id: impl Into<String>) -> Self {
    Self {
      task_id: Some(task_id.into()),
      status: TaskStatus::InProgress,
      completed_at: None,
      outputs: BTreeMap::new(),
      artifacts: BTreeMap::new(),
      item: None,
      item_id: None,
      error: None,
    }
  }

  pub fn with_item(mut self, item: impl Into<String>, item_id: Option<i64>) -> Self {
    self.item = Some(item.into());
    self.item_id = item_id;
    self
  }

  pub fn is_succeeded(&self) -> bool {
    self.status.is_succeeded()
  }

  /// Case-insensitive match against a forEach item key.
  pub fn matches_item(&self, key: &str) -> bool {
    self
      .item
      .as_deref()
      .is_some_and(|item| item.eq_ignore_ascii_case(key))
  }
}

/// Task state for one task type: a single record, or one record per forEach item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskEntry {
  Single(TaskState),
  Items(Vec<TaskState>),
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_status_wire_format() {
    assert_eq!(
      serde_json::to_value(TaskStatus::InProgress).unwrap(),
      json!("IN_PROGRESS")
    );
    let status: TaskStatus = serde_json::from_value(json!("CANCELED")).unwrap();
    assert_eq!(status, TaskStatus::Canceled);
  }

  #[test]
  fn test_status_from_remote() {
    assert_eq!(
      TaskStatus::from_remote("succeeded"),
      Some(TaskStatus::Succeeded)
    );
    assert_eq!(TaskStatus::from_remote("EXPIRED"), Some(TaskStatus::Failed));
    assert_eq!(TaskStatus::from_remote("bogus"), None);
    assert!(TaskStatus::Canceled.is_terminal());
    assert!(!TaskStatus::InProgress.is_terminal());
  }

  #[test]
  fn test_entry_shapes() {
    let single: TaskEntry = serde_json::from_value(json!({
      "taskId": "t-1",
      "status": "SUCCEEDED"
    }))
    .unwrap();
    assert!(matches!(single, TaskEntry::Single(ref s) if s.is_succeeded()));

    let items: TaskEntry = serde_json::from_value(json!([
      { "taskId": "t-2", "status": "SUCCEEDED", "item": "Idle", "itemId": 0 },
      { "taskId": "t-3", "status": "FAILED", "item": "walk" }
    ]))
    .unwrap();
    match items {
      TaskEntry::Items(items) => {
        assert_eq!(items.len(), 2);
        assert!(items[0].matches_item("idle"));
        assert_eq!(items[0].item_id, Some(0));
        assert!(!items[1].is_succeeded());
      }
      TaskEntry::Single(_) => panic!("expected item list"),
    }
  }

  #[test]
  fn test_empty_fields_are_not_serialized() {
    let state = TaskState::in_progress("t-9");
    let value = serde_json::to_value(&state).unwrap();
    assert_eq!(value, json!({ "taskId": "t-9", "status": "IN_PROGRESS" }));
  }
}
