use async_trait::async_trait;
use kiln_manifest::TaskStatus;

use crate::error::RemoteError;

/// Terminal state of a remote task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
  pub status: TaskStatus,
  /// The full task document as last reported by the service.
  pub response: serde_json::Value,
}

impl TaskOutcome {
  /// Error message reported by the service, if any.
  pub fn error_message(&self) -> Option<String> {
    let error = self.response.get("task_error").or_else(|| self.response.get("error"))?;
    match error {
      serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
      serde_json::Value::Object(map) => map
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(|m| m.to_string()),
      _ => None,
    }
  }
}

/// Remote execution backend.
#[async_trait]
pub trait Backend: Send + Sync {
  /// Submit a request body to an endpoint. Returns the remote task id.
  async fn submit(&self, endpoint: &str, body: &serde_json::Value) -> Result<String, RemoteError>;

  /// Block until the task reaches SUCCEEDED, FAILED, or CANCELED.
  async fn wait_for_terminal(
    &self,
    endpoint: &str,
    task_id: &str,
  ) -> Result<TaskOutcome, RemoteError>;
}
