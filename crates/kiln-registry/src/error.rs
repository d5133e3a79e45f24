use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid document {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unknown task type: {0}")]
  UnknownTaskType(String),

  #[error("circular dependency detected at task type '{task_type}'")]
  CircularDependency { task_type: String },

  #[error("task type '{name}' is defined more than once")]
  DuplicateTaskType { name: String },
}
