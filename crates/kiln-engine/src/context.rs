use std::collections::HashMap;
use std::path::PathBuf;

use kiln_config::StepDef;
use kiln_manifest::{AssetManifest, ManifestError, TaskState};
use kiln_resolver::StepOutputs;
use serde_json::Value;

use crate::foreach::Item;
use crate::result::StepResult;

/// Results of completed steps, keyed by step id.
#[derive(Debug, Clone, Default)]
pub struct StepResults {
  results: HashMap<String, StepResult>,
}

impl StepResults {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, step_id: &str) -> Option<&StepResult> {
    self.results.get(step_id)
  }

  pub fn contains(&self, step_id: &str) -> bool {
    self.results.contains_key(step_id)
  }

  pub fn insert(&mut self, result: StepResult) {
    self.results.insert(result.step_id.clone(), result);
  }

  pub fn len(&self) -> usize {
    self.results.len()
  }

  pub fn is_empty(&self) -> bool {
    self.results.is_empty()
  }
}

impl StepOutputs for StepResults {
  fn step_outputs(&self, step_id: &str) -> Option<&Value> {
    self.results.get(step_id).map(|r| &r.outputs)
  }
}

/// Mutable state of one pipeline run against one asset directory.
#[derive(Debug)]
pub struct ExecutionContext {
  pub asset_dir: PathBuf,
  pub manifest: AssetManifest,
  pub seed: u32,
  pub results: StepResults,
  /// Variables of the forEach item being executed, empty otherwise.
  pub vars: serde_json::Map<String, Value>,
}

impl ExecutionContext {
  pub fn new(asset_dir: impl Into<PathBuf>, manifest: AssetManifest, seed: u32) -> Self {
    Self {
      asset_dir: asset_dir.into(),
      manifest,
      seed,
      results: StepResults::new(),
      vars: serde_json::Map::new(),
    }
  }

  /// Persisted record for a step, or for one item of a forEach step.
  pub(crate) fn persisted(&self, step: &StepDef, item: Option<&Item>) -> Option<&TaskState> {
    match item {
      Some(item) => self.manifest.find_item(&step.task_type, &item.key),
      None => self.manifest.task(&step.task_type),
    }
  }

  /// Record a state transition in the in-memory manifest.
  pub(crate) fn record(&mut self, step: &StepDef, item: Option<&Item>, state: TaskState) {
    match item {
      Some(item) => self.manifest.upsert_item(
        &step.task_type,
        state.with_item(item.key.clone(), item.id),
      ),
      None => self.manifest.set_task(&step.task_type, state),
    }
  }

  /// Write the manifest back to the asset directory.
  pub async fn flush(&self) -> Result<(), ManifestError> {
    kiln_manifest::save(&self.asset_dir, &self.manifest).await
  }
}
