//! Step and run results.

use std::collections::BTreeMap;

use kiln_manifest::{TaskState, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outputs of a completed step, as seen by later steps' bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
  pub step_id: String,
  pub status: TaskStatus,
  /// Remote task id. `None` for forEach steps, which span many tasks.
  pub task_id: Option<String>,
  /// A JSON object. For forEach steps it is keyed by item, one object of
  /// outputs per item.
  pub outputs: Value,
  pub artifacts: BTreeMap<String, String>,
}

impl StepResult {
  /// Result of a single-task step. The task id is exposed as the
  /// `task_id` output unless the step declares one itself.
  pub fn from_state(step_id: &str, state: &TaskState) -> Self {
    let mut outputs: serde_json::Map<String, Value> = state
      .outputs
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    if let Some(task_id) = &state.task_id {
      outputs
        .entry("task_id")
        .or_insert_with(|| Value::String(task_id.clone()));
    }

    Self {
      step_id: step_id.to_string(),
      status: state.status,
      task_id: state.task_id.clone(),
      outputs: Value::Object(outputs),
      artifacts: state.artifacts.clone(),
    }
  }

  /// Aggregate result of a finished forEach step.
  pub fn from_items(step_id: &str, items: &[TaskState]) -> Self {
    let mut outputs = serde_json::Map::new();
    let mut artifacts = BTreeMap::new();

    for state in items {
      let Some(item) = &state.item else { continue };
      let item_outputs = state
        .outputs
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
      outputs.insert(item.clone(), Value::Object(item_outputs));
      artifacts.extend(state.artifacts.clone());
    }

    Self {
      step_id: step_id.to_string(),
      status: TaskStatus::Succeeded,
      task_id: None,
      outputs: Value::Object(outputs),
      artifacts,
    }
  }
}

/// What a call to `execute` did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
  pub run_id: String,
  /// Units of work submitted to the backend: a step id, or `step[item]`.
  pub submitted: Vec<String>,
  /// Units whose persisted in-flight task was polled instead of resubmitted.
  pub reattached: Vec<String>,
  /// Units skipped because they had already succeeded.
  pub skipped: Vec<String>,
  /// Units whose remote task ended FAILED or CANCELED.
  pub failed: Vec<String>,
}

impl RunSummary {
  pub fn new(run_id: impl Into<String>) -> Self {
    Self {
      run_id: run_id.into(),
      ..Self::default()
    }
  }
}
