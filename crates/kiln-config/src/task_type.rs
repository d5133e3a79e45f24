use serde::{Deserialize, Serialize};

/// Descriptor of a kind of remote task.
///
/// ```json
/// { "name": "rig", "endpoint": "openapi/v1/rigging", "dependencies": ["model"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTypeDef {
  pub name: String,
  /// Submission endpoint on the remote backend, relative to its base URL.
  pub endpoint: String,
  /// Task types that must have produced their results before this one can run.
  #[serde(default)]
  pub dependencies: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}
