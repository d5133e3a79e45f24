use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::state::{TaskEntry, TaskState};

/// The durable record for one generated asset.
///
/// ```json
/// {
///   "id": "knight",
///   "name": "Knight",
///   "type": "character",
///   "description": "armored knight with a tabard",
///   "seed": 1934112,
///   "concept": { "prompt": "armored knight, full body, t-pose" },
///   "animations": { "preset": "basic" },
///   "tasks": {
///     "concept": { "taskId": "0193...", "status": "SUCCEEDED", "artifacts": { "concept": "concept.png" } }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetManifest {
  pub id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub asset_type: String,
  #[serde(default)]
  pub description: String,
  /// Set at most once, then sent with every remote request.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub seed: Option<u32>,
  /// Execution state keyed by task type name.
  #[serde(default)]
  pub tasks: BTreeMap<String, TaskEntry>,
  /// Per-task-type configuration blocks, e.g. `"concept": { "prompt": "..." }`.
  #[serde(flatten)]
  pub config: BTreeMap<String, serde_json::Value>,
}

impl AssetManifest {
  pub fn new(
    id: impl Into<String>,
    name: impl Into<String>,
    asset_type: impl Into<String>,
    description: impl Into<String>,
  ) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      asset_type: asset_type.into(),
      description: description.into(),
      seed: None,
      tasks: BTreeMap::new(),
      config: BTreeMap::new(),
    }
  }

  /// The single task record for a task type, if it is not an item list.
  pub fn task(&self, task_type: &str) -> Option<&TaskState> {
    match self.tasks.get(task_type)? {
      TaskEntry::Single(state) => Some(state),
      TaskEntry::Items(_) => None,
    }
  }

  /// The forEach item records for a task type.
  pub fn items(&self, task_type: &str) -> &[TaskState] {
    match self.tasks.get(task_type) {
      Some(TaskEntry::Items(items)) => items,
      _ => &[],
    }
  }

  /// Find the record of one forEach item (case-insensitive).
  pub fn find_item(&self, task_type: &str, item_key: &str) -> Option<&TaskState> {
    self
      .items(task_type)
      .iter()
      .find(|state| state.matches_item(item_key))
  }

  /// Replace the single task record for a task type.
  pub fn set_task(&mut self, task_type: &str, state: TaskState) {
    self
      .tasks
      .insert(task_type.to_string(), TaskEntry::Single(state));
  }

  /// Insert or replace the record of one forEach item, matched on `state.item`.
  ///
  /// Records without an item are appended.
  pub fn upsert_item(&mut self, task_type: &str, state: TaskState) {
    let entry = self
      .tasks
      .entry(task_type.to_string())
      .or_insert_with(|| TaskEntry::Items(Vec::new()));

    if let TaskEntry::Single(_) = entry {
      *entry = TaskEntry::Items(Vec::new());
    }

    if let TaskEntry::Items(items) = entry {
      let existing = state
        .item
        .as_deref()
        .and_then(|key| items.iter().position(|s| s.matches_item(key)));
      match existing {
        Some(index) => items[index] = state,
        None => items.push(state),
      }
    }
  }

  /// The manifest as a JSON value, for path-based reads.
  pub fn to_value(&self) -> Result<serde_json::Value, ManifestError> {
    Ok(serde_json::to_value(self)?)
  }
}
