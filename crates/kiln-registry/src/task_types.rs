use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use kiln_config::TaskTypeDef;
use tokio::fs;
use tracing::debug;

use crate::error::RegistryError;

/// Registry of task type descriptors.
///
/// Descriptors are stored one per file:
/// ```text
/// {root}/
/// ├── concept.json
/// ├── model.json
/// └── rig.json
/// ```
#[derive(Debug, Default)]
pub struct TaskTypeRegistry {
  root: Option<PathBuf>,
  types: HashMap<String, TaskTypeDef>,
  loaded: bool,
}

impl TaskTypeRegistry {
  /// Create a registry backed by a directory. Nothing is read until
  /// [`ensure_loaded`](Self::ensure_loaded).
  pub fn open(root: impl Into<PathBuf>) -> Self {
    Self {
      root: Some(root.into()),
      types: HashMap::new(),
      loaded: false,
    }
  }

  /// Open and load a registry directory.
  pub async fn load(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
    let mut registry = Self::open(root);
    registry.ensure_loaded().await?;
    Ok(registry)
  }

  /// Build a registry from descriptors already in memory.
  pub fn from_descriptors(
    descriptors: impl IntoIterator<Item = TaskTypeDef>,
  ) -> Result<Self, RegistryError> {
    let mut registry = Self::default();
    for def in descriptors {
      registry.insert(def)?;
    }
    registry.loaded = true;
    Ok(registry)
  }

  /// Read every descriptor in the backing directory. Subsequent calls are no-ops.
  pub async fn ensure_loaded(&mut self) -> Result<(), RegistryError> {
    if self.loaded {
      return Ok(());
    }

    if let Some(root) = self.root.clone() {
      let mut entries = fs::read_dir(&root).await?;
      while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
          continue;
        }
        let def = read_descriptor(&path).await?;
        debug!(task_type = %def.name, endpoint = %def.endpoint, "loaded task type");
        self.insert(def)?;
      }
    }

    self.loaded = true;
    Ok(())
  }

  fn insert(&mut self, def: TaskTypeDef) -> Result<(), RegistryError> {
    if self.types.contains_key(&def.name) {
      return Err(RegistryError::DuplicateTaskType { name: def.name });
    }
    self.types.insert(def.name.clone(), def);
    Ok(())
  }

  pub fn is_loaded(&self) -> bool {
    self.loaded
  }

  /// Get a descriptor by name.
  pub fn get(&self, name: &str) -> Option<&TaskTypeDef> {
    self.types.get(name)
  }

  /// Submission endpoint of a task type.
  pub fn endpoint(&self, name: &str) -> Result<&str, RegistryError> {
    self
      .get(name)
      .map(|def| def.endpoint.as_str())
      .ok_or_else(|| RegistryError::UnknownTaskType(name.to_string()))
  }

  /// All registered task type names, sorted.
  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.types.keys().map(|k| k.as_str()).collect();
    names.sort_unstable();
    names
  }

  /// Dependency-first ordering of `target` and everything it transitively depends on.
  ///
  /// Every dependency appears before its dependents; `target` is last.
  /// Unrelated types carry no ordering guarantee.
  pub fn dependency_chain(&self, target: &str) -> Result<Vec<String>, RegistryError> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut in_progress = HashSet::new();
    self.visit(target, &mut visited, &mut in_progress, &mut chain)?;
    Ok(chain)
  }

  fn visit<'a>(
    &'a self,
    name: &'a str,
    visited: &mut HashSet<&'a str>,
    in_progress: &mut HashSet<&'a str>,
    chain: &mut Vec<String>,
  ) -> Result<(), RegistryError> {
    if visited.contains(name) {
      return Ok(());
    }
    if in_progress.contains(name) {
      return Err(RegistryError::CircularDependency {
        task_type: name.to_string(),
      });
    }

    let def = self
      .types
      .get(name)
      .ok_or_else(|| RegistryError::UnknownTaskType(name.to_string()))?;

    in_progress.insert(name);
    for dep in &def.dependencies {
      self.visit(dep, visited, in_progress, chain)?;
    }
    in_progress.remove(name);

    visited.insert(name);
    chain.push(name.to_string());
    Ok(())
  }
}

async fn read_descriptor(path: &Path) -> Result<TaskTypeDef, RegistryError> {
  let content = fs::read_to_string(path).await?;
  serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
    path: path.to_path_buf(),
    source,
  })
}
