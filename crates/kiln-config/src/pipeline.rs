use serde::{Deserialize, Serialize};

use crate::step::StepDef;

/// A named, ordered list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  pub steps: Vec<StepDef>,
}

impl PipelineDef {
  /// Get a step by ID.
  pub fn get_step(&self, step_id: &str) -> Option<&StepDef> {
    self.steps.iter().find(|s| s.id == step_id)
  }
}
