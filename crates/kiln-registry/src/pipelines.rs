use std::path::{Path, PathBuf};

use async_trait::async_trait;
use kiln_config::PipelineDef;
use tokio::fs;

use crate::error::RegistryError;

/// Source of named pipeline definitions.
#[async_trait]
pub trait PipelineLibrary: Send + Sync {
  /// Load a pipeline definition by name. Returns `None` if it does not exist.
  async fn load(&self, name: &str) -> Result<Option<PipelineDef>, RegistryError>;

  /// Names of all available pipelines.
  async fn list(&self) -> Result<Vec<String>, RegistryError>;
}

/// Filesystem-based pipeline library.
///
/// Pipelines are stored one per file as `{root}/{name}.json`. Definitions are
/// read from disk on every load and never cached.
pub struct FsPipelineLibrary {
  root: PathBuf,
}

impl FsPipelineLibrary {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn pipeline_path(&self, name: &str) -> PathBuf {
    self.root.join(format!("{}.json", name))
  }
}

#[async_trait]
impl PipelineLibrary for FsPipelineLibrary {
  async fn load(&self, name: &str) -> Result<Option<PipelineDef>, RegistryError> {
    let path = self.pipeline_path(name);
    let content = match fs::read_to_string(&path).await {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };

    let def = serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
      path: path.clone(),
      source,
    })?;
    Ok(Some(def))
  }

  async fn list(&self) -> Result<Vec<String>, RegistryError> {
    let mut names = Vec::new();

    if !self.root.exists() {
      return Ok(names);
    }

    let mut entries = fs::read_dir(&self.root).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) == Some("json")
        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
      {
        names.push(stem.to_string());
      }
    }

    names.sort();
    Ok(names)
  }
}
