//! Pipeline executor implementation.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use kiln_config::{CollectionSource, ForEachDef, ItemFailurePolicy, PipelineDef, StepDef};
use kiln_manifest::{AssetManifest, TaskState, TaskStatus, is_binary_payload};
use kiln_registry::{LookupTables, PipelineLibrary, TaskTypeRegistry};
use kiln_remote::{Backend, Downloader};
use kiln_resolver::{ResolveContext, extract, render_template, resolve_inputs};
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::artifacts;
use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::foreach::{self, Item};
use crate::result::{RunSummary, StepResult};

/// Collaborators the executor needs, loaded before the first run.
#[derive(Clone)]
pub struct ExecutorDeps {
  pub pipelines: Arc<dyn PipelineLibrary>,
  pub task_types: Arc<TaskTypeRegistry>,
  pub lookups: Arc<LookupTables>,
  pub backend: Arc<dyn Backend>,
  pub downloader: Arc<dyn Downloader>,
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
  /// Run only this step. Its dependencies must already be SUCCEEDED.
  pub step: Option<String>,
}

/// The pipeline executor.
///
/// Walks a pipeline's steps in declaration order against one asset
/// directory, submitting remote tasks and recording every transition in the
/// asset manifest.
pub struct PipelineExecutor<N: ExecutionNotifier = NoopNotifier> {
  deps: ExecutorDeps,
  notifier: N,
}

impl PipelineExecutor {
  pub fn new(deps: ExecutorDeps) -> Self {
    Self::with_notifier(deps, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> PipelineExecutor<N> {
  pub fn with_notifier(deps: ExecutorDeps, notifier: N) -> Self {
    Self { deps, notifier }
  }

  /// Run a pipeline, or one of its steps, against an asset directory.
  #[instrument(
    name = "pipeline_execute",
    skip(self, pipeline_name, asset_dir, options),
    fields(
      pipeline = %pipeline_name,
      asset_dir = %asset_dir.display(),
    )
  )]
  pub async fn execute(
    &self,
    pipeline_name: &str,
    asset_dir: &Path,
    options: ExecuteOptions,
  ) -> Result<RunSummary, EngineError> {
    let mut summary = RunSummary::new(uuid::Uuid::new_v4().to_string());

    let result = self
      .run(pipeline_name, asset_dir, &options, &mut summary)
      .await;

    match &result {
      Ok(()) => {
        info!(
          run_id = %summary.run_id,
          submitted = summary.submitted.len(),
          reattached = summary.reattached.len(),
          skipped = summary.skipped.len(),
          failed = summary.failed.len(),
          "run_completed"
        );
        self.notifier.notify(ExecutionEvent::RunCompleted {
          run_id: summary.run_id.clone(),
        });
      }
      Err(e) => {
        error!(
          run_id = %summary.run_id,
          error = %e,
          "run_failed"
        );
        self.notifier.notify(ExecutionEvent::RunFailed {
          run_id: summary.run_id.clone(),
          error: e.to_string(),
        });
      }
    }

    result.map(|()| summary)
  }

  async fn run(
    &self,
    pipeline_name: &str,
    asset_dir: &Path,
    options: &ExecuteOptions,
    summary: &mut RunSummary,
  ) -> Result<(), EngineError> {
    let pipeline = self
      .deps
      .pipelines
      .load(pipeline_name)
      .await?
      .ok_or_else(|| EngineError::PipelineNotFound(pipeline_name.to_string()))?;

    self.validate_pipeline(&pipeline)?;

    let steps: Vec<&StepDef> = match options.step.as_deref() {
      Some(step_id) => {
        let step = pipeline
          .get_step(step_id)
          .ok_or_else(|| EngineError::StepNotFound {
            pipeline: pipeline.name.clone(),
            step_id: step_id.to_string(),
          })?;
        vec![step]
      }
      None => pipeline.steps.iter().collect(),
    };

    let mut manifest = kiln_manifest::load(asset_dir)
      .await?
      .ok_or_else(|| EngineError::ManifestNotFound(kiln_manifest::manifest_path(asset_dir)))?;

    info!(
      run_id = %summary.run_id,
      pipeline = %pipeline.name,
      asset_id = %manifest.id,
      steps = steps.len(),
      "run_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: summary.run_id.clone(),
      pipeline: pipeline.name.clone(),
      asset_id: manifest.id.clone(),
    });

    let seed = self.ensure_seed(&mut manifest, asset_dir, summary).await?;
    let mut ctx = ExecutionContext::new(asset_dir, manifest, seed);
    self.restore_results(&pipeline, &mut ctx);

    for step in steps {
      let result = self.run_step(step, &mut ctx, summary).await;
      // whatever was recorded before a failure is kept
      ctx.flush().await?;
      result?;
    }

    Ok(())
  }

  /// Reject pipelines that cannot run, before anything touches the network.
  fn validate_pipeline(&self, pipeline: &PipelineDef) -> Result<(), EngineError> {
    let invalid = |message: String| EngineError::InvalidPipeline {
      pipeline: pipeline.name.clone(),
      message,
    };

    let mut step_ids = HashSet::new();
    for step in &pipeline.steps {
      if !step_ids.insert(step.id.as_str()) {
        return Err(invalid(format!("duplicate step id '{}'", step.id)));
      }
    }

    for step in &pipeline.steps {
      for dependency in &step.depends_on {
        if dependency == &step.id {
          return Err(invalid(format!("step '{}' depends on itself", step.id)));
        }
        if !step_ids.contains(dependency.as_str()) {
          return Err(invalid(format!(
            "step '{}' depends on unknown step '{}'",
            step.id, dependency
          )));
        }
      }

      if let Some(ForEachDef {
        collection: CollectionSource::Step { step: source, .. },
        ..
      }) = &step.for_each
        && !step_ids.contains(source.as_str())
      {
        return Err(invalid(format!(
          "forEach of step '{}' reads unknown step '{}'",
          step.id, source
        )));
      }

      // unknown task types and cyclic task type dependencies
      self.deps.task_types.dependency_chain(&step.task_type)?;
    }

    Ok(())
  }

  /// Return the asset's seed, generating and persisting one if it has none.
  async fn ensure_seed(
    &self,
    manifest: &mut AssetManifest,
    asset_dir: &Path,
    summary: &RunSummary,
  ) -> Result<u32, EngineError> {
    if let Some(seed) = manifest.seed {
      return Ok(seed);
    }

    let seed = OsRng.next_u32();
    manifest.seed = Some(seed);
    kiln_manifest::save(asset_dir, manifest).await?;

    info!(run_id = %summary.run_id, seed, "seed_generated");
    self.notifier.notify(ExecutionEvent::SeedGenerated {
      run_id: summary.run_id.clone(),
      seed,
    });
    Ok(seed)
  }

  /// Seed the result cache with steps the manifest already records as done.
  fn restore_results(&self, pipeline: &PipelineDef, ctx: &mut ExecutionContext) {
    for step in &pipeline.steps {
      if let Some(result) = self.persisted_result(step, ctx) {
        debug!(step_id = %step.id, "step_restored");
        ctx.results.insert(result);
      }
    }
  }

  fn persisted_result(&self, step: &StepDef, ctx: &ExecutionContext) -> Option<StepResult> {
    match &step.for_each {
      None => ctx
        .manifest
        .task(&step.task_type)
        .filter(|state| state.is_succeeded())
        .map(|state| StepResult::from_state(&step.id, state)),
      Some(for_each) => {
        let items = foreach::resolve_collection(step, for_each, ctx, &self.deps.lookups).ok()?;
        foreach::iteration_complete(for_each, &items, &ctx.manifest, &step.task_type)
          .then(|| StepResult::from_items(&step.id, ctx.manifest.items(&step.task_type)))
      }
    }
  }

  async fn run_step(
    &self,
    step: &StepDef,
    ctx: &mut ExecutionContext,
    summary: &mut RunSummary,
  ) -> Result<(), EngineError> {
    for dependency in &step.depends_on {
      if !ctx.results.contains(dependency) {
        warn!(
          run_id = %summary.run_id,
          step_id = %step.id,
          dependency = %dependency,
          "dependency_not_completed"
        );
        return Err(EngineError::DependencyNotCompleted {
          step_id: step.id.clone(),
          dependency: dependency.clone(),
        });
      }
    }

    if ctx.results.contains(&step.id) {
      info!(run_id = %summary.run_id, step_id = %step.id, "step_skipped");
      self.notifier.notify(ExecutionEvent::StepSkipped {
        run_id: summary.run_id.clone(),
        step_id: step.id.clone(),
      });
      summary.skipped.push(step.id.clone());
      return Ok(());
    }

    info!(
      run_id = %summary.run_id,
      step_id = %step.id,
      task_type = %step.task_type,
      "step_started"
    );
    self.notifier.notify(ExecutionEvent::StepStarted {
      run_id: summary.run_id.clone(),
      step_id: step.id.clone(),
    });

    match &step.for_each {
      Some(for_each) => self.run_iterated(step, for_each, ctx, summary).await,
      None => {
        let state = self.run_task(step, None, ctx, summary).await?;
        if state.is_succeeded() {
          ctx.results.insert(StepResult::from_state(&step.id, &state));
        }
        Ok(())
      }
    }
  }

  async fn run_iterated(
    &self,
    step: &StepDef,
    for_each: &ForEachDef,
    ctx: &mut ExecutionContext,
    summary: &mut RunSummary,
  ) -> Result<(), EngineError> {
    let values = foreach::resolve_collection(step, for_each, ctx, &self.deps.lookups)?;
    info!(
      run_id = %summary.run_id,
      step_id = %step.id,
      items = values.len(),
      "foreach_expanded"
    );

    let mut all_succeeded = true;
    for value in values {
      let item = Item::new(value, for_each, &self.deps.lookups);

      let done = ctx
        .persisted(step, Some(&item))
        .is_some_and(|state| state.is_succeeded());
      if done {
        info!(
          run_id = %summary.run_id,
          step_id = %step.id,
          item = %item.key,
          "item_skipped"
        );
        self.notifier.notify(ExecutionEvent::ItemSkipped {
          run_id: summary.run_id.clone(),
          step_id: step.id.clone(),
          item: item.key.clone(),
        });
        summary.skipped.push(item.label(&step.id));
        continue;
      }

      ctx.vars = item.vars(for_each);
      let state = self.run_task(step, Some(&item), ctx, summary).await;
      ctx.vars.clear();
      let state = state?;
      ctx.flush().await?;

      if !state.is_succeeded() {
        all_succeeded = false;
        if for_each.on_item_failure == ItemFailurePolicy::Halt {
          warn!(
            run_id = %summary.run_id,
            step_id = %step.id,
            item = %item.key,
            "foreach_halted"
          );
          break;
        }
      }
    }

    let completed = match for_each.on_item_failure {
      ItemFailurePolicy::Tolerate => true,
      ItemFailurePolicy::Continue | ItemFailurePolicy::Halt => all_succeeded,
    };
    if completed {
      ctx
        .results
        .insert(StepResult::from_items(&step.id, ctx.manifest.items(&step.task_type)));
    }

    Ok(())
  }

  /// Run one remote task: a whole step, or one forEach item.
  ///
  /// A FAILED or CANCELED outcome is recorded and returned, not raised.
  async fn run_task(
    &self,
    step: &StepDef,
    item: Option<&Item>,
    ctx: &mut ExecutionContext,
    summary: &mut RunSummary,
  ) -> Result<TaskState, EngineError> {
    let endpoint = self.deps.task_types.endpoint(&step.task_type)?;
    let label = item.map_or_else(|| step.id.clone(), |item| item.label(&step.id));
    let item_key = item.map(|item| item.key.clone());

    let in_flight = ctx
      .persisted(step, item)
      .filter(|state| state.status == TaskStatus::InProgress)
      .and_then(|state| state.task_id.clone());

    let task_id = match in_flight {
      Some(task_id) => {
        info!(
          run_id = %summary.run_id,
          step_id = %step.id,
          item = ?item_key,
          task_id = %task_id,
          "task_reattached"
        );
        self.notifier.notify(ExecutionEvent::TaskReattached {
          run_id: summary.run_id.clone(),
          step_id: step.id.clone(),
          item: item_key.clone(),
          task_id: task_id.clone(),
        });
        summary.reattached.push(label.clone());
        task_id
      }
      None => {
        let body = self.build_body(step, ctx)?;
        let task_id = self.deps.backend.submit(endpoint, &body).await?;

        info!(
          run_id = %summary.run_id,
          step_id = %step.id,
          item = ?item_key,
          endpoint = %endpoint,
          task_id = %task_id,
          "task_submitted"
        );
        self.notifier.notify(ExecutionEvent::TaskSubmitted {
          run_id: summary.run_id.clone(),
          step_id: step.id.clone(),
          item: item_key.clone(),
          task_id: task_id.clone(),
        });
        summary.submitted.push(label.clone());

        ctx.record(step, item, TaskState::in_progress(&task_id));
        ctx.flush().await?;
        task_id
      }
    };

    let outcome = self.deps.backend.wait_for_terminal(endpoint, &task_id).await?;
    let mut state = TaskState::in_progress(&task_id);
    state.status = outcome.status;
    state.completed_at = Some(Utc::now());

    if !outcome.status.is_succeeded() {
      state.error = outcome.error_message();
      warn!(
        run_id = %summary.run_id,
        step_id = %step.id,
        item = ?item_key,
        task_id = %task_id,
        status = %outcome.status,
        error = ?state.error,
        "task_failed"
      );
      self.notifier.notify(ExecutionEvent::TaskFailed {
        run_id: summary.run_id.clone(),
        step_id: step.id.clone(),
        item: item_key,
        task_id,
        status: outcome.status,
        error: state.error.clone(),
      });
      summary.failed.push(label);
      ctx.record(step, item, state.clone());
      return Ok(state);
    }

    state.artifacts = self
      .materialize_artifacts(step, &outcome.response, ctx, summary)
      .await?;
    state.outputs = extract_outputs(step, &outcome.response, &ctx.vars)?;
    ctx.record(step, item, state.clone());

    info!(
      run_id = %summary.run_id,
      step_id = %step.id,
      item = ?item_key,
      task_id = %task_id,
      outputs = state.outputs.len(),
      artifacts = state.artifacts.len(),
      "task_succeeded"
    );
    self.notifier.notify(ExecutionEvent::TaskSucceeded {
      run_id: summary.run_id.clone(),
      step_id: step.id.clone(),
      item: item_key,
      task_id,
    });

    Ok(state)
  }

  /// Resolve a step's inputs into a request body carrying the asset seed.
  fn build_body(&self, step: &StepDef, ctx: &ExecutionContext) -> Result<Value, EngineError> {
    let manifest = ctx.manifest.to_value()?;
    let resolve_ctx = ResolveContext {
      manifest: &manifest,
      steps: &ctx.results,
      lookups: self.deps.lookups.as_ref(),
      vars: &ctx.vars,
    };

    let mut body = resolve_inputs(&step.id, &step.inputs, &resolve_ctx)?;
    body.insert("seed".to_string(), Value::from(ctx.seed));
    Ok(Value::Object(body))
  }

  /// Download every declared artifact. Returns artifact name -> relative path.
  async fn materialize_artifacts(
    &self,
    step: &StepDef,
    response: &Value,
    ctx: &ExecutionContext,
    summary: &RunSummary,
  ) -> Result<BTreeMap<String, String>, EngineError> {
    let mut saved = BTreeMap::new();

    for (local_path, response_path) in &step.artifacts {
      let local_path = render_template(local_path, &ctx.vars)?;
      let response_path = render_template(response_path, &ctx.vars)?;

      let Some(value) = extract(response, &response_path)?.filter(|v| !v.is_null()) else {
        warn!(
          run_id = %summary.run_id,
          step_id = %step.id,
          path = %response_path,
          "artifact_missing"
        );
        continue;
      };

      for (path, url) in artifacts::plan(&step.id, &local_path, value)? {
        let bytes = self
          .deps
          .downloader
          .download(&url, &ctx.asset_dir.join(&path))
          .await
          .map_err(|source| EngineError::Download {
            step_id: step.id.clone(),
            url: url.clone(),
            source,
          })?;

        info!(
          run_id = %summary.run_id,
          step_id = %step.id,
          path = %path,
          bytes,
          "artifact_saved"
        );
        self.notifier.notify(ExecutionEvent::ArtifactSaved {
          run_id: summary.run_id.clone(),
          step_id: step.id.clone(),
          path: path.clone(),
        });
        saved.insert(artifacts::artifact_name(&path), path);
      }
    }

    Ok(saved)
  }
}

/// Read declared outputs from a task response. Missing values are left out
/// and binary payloads never reach the manifest.
fn extract_outputs(
  step: &StepDef,
  response: &Value,
  vars: &serde_json::Map<String, Value>,
) -> Result<BTreeMap<String, Value>, EngineError> {
  let mut outputs = BTreeMap::new();

  for (name, path) in &step.outputs {
    let path = render_template(path, vars)?;
    match extract(response, &path)? {
      None | Some(Value::Null) => {
        debug!(step_id = %step.id, output = %name, "output_missing");
      }
      Some(value) if is_binary_payload(value) => {
        warn!(step_id = %step.id, output = %name, "binary_output_dropped");
      }
      Some(value) => {
        outputs.insert(name.clone(), value.clone());
      }
    }
  }

  Ok(outputs)
}
