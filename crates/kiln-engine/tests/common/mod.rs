#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kiln_config::TaskTypeDef;
use kiln_engine::{ExecutionNotifier, ExecutorDeps, PipelineExecutor};
use kiln_manifest::{AssetManifest, TaskStatus};
use kiln_registry::{FsPipelineLibrary, LookupTable, LookupTables, TaskTypeRegistry};
use kiln_remote::{Backend, Downloader, RemoteError, TaskOutcome};
use serde_json::{Value, json};
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct Submission {
  pub endpoint: String,
  pub body: Value,
  pub task_id: String,
}

/// In-memory backend. Every task succeeds with the document registered for
/// its endpoint unless a failure or crash rule matches the request body.
#[derive(Default)]
pub struct MockBackend {
  responses: HashMap<String, Value>,
  failing: Vec<(String, Value)>,
  crash_on: Option<(String, Value)>,
  submissions: Mutex<Vec<Submission>>,
  polls: Mutex<Vec<String>>,
  next_id: AtomicUsize,
}

impl MockBackend {
  pub fn new() -> Self {
    Self::default()
      .respond(
        CONCEPT_ENDPOINT,
        json!({ "image_urls": ["https://cdn/concept-a.png", "https://cdn/concept-b.png"] }),
      )
      .respond(
        MODEL_ENDPOINT,
        json!({
          "model_urls": { "glb": "https://cdn/knight.glb" },
          "thumbnail": format!("data:image/png;base64,{}", "iVBORw0KGgo".repeat(20)),
        }),
      )
      .respond(
        RIG_ENDPOINT,
        json!({ "result": { "rigged_character_glb_url": "https://cdn/rigged.glb" } }),
      )
      .respond(
        ANIMATION_ENDPOINT,
        json!({ "result": { "animation_glb_url": "https://cdn/anim.glb" } }),
      )
      .respond(EXPORT_ENDPOINT, json!({ "archive_url": "https://cdn/knight.zip" }))
  }

  pub fn respond(mut self, endpoint: &str, document: Value) -> Self {
    self.responses.insert(endpoint.to_string(), document);
    self
  }

  /// Tasks whose body has `field == value` end FAILED.
  pub fn fail_when(mut self, field: &str, value: Value) -> Self {
    self.failing.push((field.to_string(), value));
    self
  }

  /// Submitting a body with `field == value` errors, as if the process lost
  /// its connection.
  pub fn crash_when(mut self, field: &str, value: Value) -> Self {
    self.crash_on = Some((field.to_string(), value));
    self
  }

  pub fn submissions(&self) -> Vec<Submission> {
    self.submissions.lock().unwrap().clone()
  }

  pub fn submitted_to(&self, endpoint: &str) -> Vec<Value> {
    self
      .submissions()
      .into_iter()
      .filter(|s| s.endpoint == endpoint)
      .map(|s| s.body)
      .collect()
  }

  pub fn polls(&self) -> Vec<String> {
    self.polls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Backend for MockBackend {
  async fn submit(&self, endpoint: &str, body: &Value) -> Result<String, RemoteError> {
    if let Some((field, value)) = &self.crash_on
      && body.get(field) == Some(value)
    {
      return Err(RemoteError::InvalidResponse {
        url: endpoint.to_string(),
        message: "connection reset".to_string(),
      });
    }

    let task_id = format!("task-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    self.submissions.lock().unwrap().push(Submission {
      endpoint: endpoint.to_string(),
      body: body.clone(),
      task_id: task_id.clone(),
    });
    Ok(task_id)
  }

  async fn wait_for_terminal(
    &self,
    endpoint: &str,
    task_id: &str,
  ) -> Result<TaskOutcome, RemoteError> {
    self.polls.lock().unwrap().push(task_id.to_string());

    let body = self
      .submissions()
      .into_iter()
      .find(|s| s.task_id == task_id)
      .map(|s| s.body);
    let failed = body
      .as_ref()
      .is_some_and(|body| self.failing.iter().any(|(f, v)| body.get(f) == Some(v)));

    if failed {
      return Ok(TaskOutcome {
        status: TaskStatus::Failed,
        response: json!({
          "id": task_id,
          "status": "FAILED",
          "task_error": { "message": "generation failed" }
        }),
      });
    }

    let mut response = self.responses.get(endpoint).cloned().unwrap_or(json!({}));
    response["id"] = json!(task_id);
    response["status"] = json!("SUCCEEDED");
    Ok(TaskOutcome {
      status: TaskStatus::Succeeded,
      response,
    })
  }
}

/// Writes each url's text to the destination file.
#[derive(Default)]
pub struct FakeDownloader {
  fail: bool,
  downloads: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeDownloader {
  pub fn failing() -> Self {
    Self {
      fail: true,
      ..Self::default()
    }
  }

  pub fn downloads(&self) -> Vec<(String, PathBuf)> {
    self.downloads.lock().unwrap().clone()
  }
}

#[async_trait]
impl Downloader for FakeDownloader {
  async fn download(&self, url: &str, dest: &Path) -> Result<u64, RemoteError> {
    if self.fail {
      return Err(RemoteError::Status {
        url: url.to_string(),
        status: 404,
        body: "not found".to_string(),
      });
    }

    if let Some(parent) = dest.parent() {
      tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(dest, url.as_bytes()).await.unwrap();
    self
      .downloads
      .lock()
      .unwrap()
      .push((url.to_string(), dest.to_path_buf()));
    Ok(url.len() as u64)
  }
}

pub const CONCEPT_ENDPOINT: &str = "openapi/v1/text-to-image";
pub const MODEL_ENDPOINT: &str = "openapi/v1/image-to-3d";
pub const RIG_ENDPOINT: &str = "openapi/v1/rigging";
pub const ANIMATION_ENDPOINT: &str = "openapi/v1/animations";
pub const EXPORT_ENDPOINT: &str = "openapi/v1/export";

pub fn task_types() -> TaskTypeRegistry {
  let defs: Vec<TaskTypeDef> = serde_json::from_value(json!([
    { "name": "concept", "endpoint": CONCEPT_ENDPOINT },
    { "name": "model", "endpoint": MODEL_ENDPOINT, "dependencies": ["concept"] },
    { "name": "rig", "endpoint": RIG_ENDPOINT, "dependencies": ["model"] },
    { "name": "animation", "endpoint": ANIMATION_ENDPOINT, "dependencies": ["rig"] },
    { "name": "export", "endpoint": EXPORT_ENDPOINT, "dependencies": ["animation"] }
  ]))
  .unwrap();
  TaskTypeRegistry::from_descriptors(defs).unwrap()
}

pub fn lookups() -> LookupTables {
  let animations = LookupTable::new(
    [
      ("idle".to_string(), json!(0)),
      ("walk".to_string(), json!(1)),
      ("run".to_string(), json!(2)),
    ]
    .into_iter()
    .collect::<Vec<_>>(),
    HashMap::new(),
  );
  let presets = LookupTable::new(
    [
      ("basic".to_string(), json!(["idle", "walk"])),
      ("full".to_string(), json!(["idle", "walk", "run"])),
    ]
    .into_iter()
    .collect::<Vec<_>>(),
    HashMap::new(),
  );
  LookupTables::from_tables([
    ("animations".to_string(), animations),
    ("animation-presets".to_string(), presets),
  ])
}

pub fn concept_step() -> Value {
  json!({
    "id": "concept",
    "taskType": "concept",
    "inputs": {
      "prompt": { "source": "manifest", "path": "concept.prompt" },
      "negative_prompt": { "source": "manifest", "path": "concept.negative_prompt" },
      "art_style": "realistic"
    },
    "outputs": { "image_url": "image_urls[0]" },
    "artifacts": { "concept.png": "image_urls" }
  })
}

pub fn animations_step(policy: &str) -> Value {
  json!({
    "id": "animations",
    "taskType": "animation",
    "dependsOn": ["rig"],
    "forEach": {
      "source": "manifest",
      "path": "animations.names",
      "as": "animation",
      "idLookup": "animations",
      "onItemFailure": policy
    },
    "inputs": {
      "rig_task_id": { "source": "step", "step": "rig", "path": "task_id" },
      "action_id": { "source": "lookup", "table": "animations", "key": "{{ animation|lowercase }}" }
    },
    "outputs": { "glb_url": "result.animation_glb_url" },
    "artifacts": { "animations/{{ animation|lowercase }}.glb": "result.animation_glb_url" }
  })
}

pub fn character_pipeline() -> Value {
  character_pipeline_with(animations_step("continue"), None)
}

/// The character pipeline with a custom animations step and an optional
/// extra step appended.
pub fn character_pipeline_with(animations: Value, extra: Option<Value>) -> Value {
  let mut steps = vec![
    concept_step(),
    json!({
      "id": "model",
      "taskType": "model",
      "dependsOn": ["concept"],
      "inputs": {
        "image_url": { "source": "step", "step": "concept", "path": "image_url" }
      },
      "outputs": { "model_url": "model_urls.glb", "preview": "thumbnail" },
      "artifacts": { "model.glb": "model_urls.glb" }
    }),
    json!({
      "id": "rig",
      "taskType": "rig",
      "dependsOn": ["model"],
      "inputs": {
        "input_task_id": { "source": "step", "step": "model", "path": "task_id" }
      },
      "outputs": { "rigged_url": "result.rigged_character_glb_url" }
    }),
    animations,
  ];
  steps.extend(extra);
  json!({ "name": "character", "steps": steps })
}

pub fn export_step() -> Value {
  json!({
    "id": "export",
    "taskType": "export",
    "dependsOn": ["animations"],
    "inputs": {
      "rig_task_id": { "source": "step", "step": "rig", "path": "task_id" }
    },
    "outputs": { "archive_url": "archive_url" }
  })
}

pub fn knight_manifest() -> Value {
  json!({
    "id": "knight",
    "name": "Knight",
    "type": "character",
    "description": "armored knight",
    "concept": { "prompt": "armored knight, t-pose" },
    "animations": { "preset": "basic" }
  })
}

/// Task records of a knight whose concept, model, and rig are done.
pub fn rigged_tasks() -> Value {
  json!({
    "concept": {
      "taskId": "t-concept",
      "status": "SUCCEEDED",
      "outputs": { "image_url": "https://cdn/concept-a.png" }
    },
    "model": {
      "taskId": "t-model",
      "status": "SUCCEEDED",
      "outputs": { "model_url": "https://cdn/knight.glb" }
    },
    "rig": {
      "taskId": "t-rig",
      "status": "SUCCEEDED"
    }
  })
}

pub struct Fixture {
  _dir: TempDir,
  pub pipelines_dir: PathBuf,
  pub asset_dir: PathBuf,
}

impl Fixture {
  pub async fn new(pipeline: Value, manifest: Value) -> Self {
    let dir = TempDir::new().unwrap();
    let pipelines_dir = dir.path().join("pipelines");
    let asset_dir = dir.path().join("assets").join("knight");
    tokio::fs::create_dir_all(&pipelines_dir).await.unwrap();
    tokio::fs::create_dir_all(&asset_dir).await.unwrap();

    let name = pipeline["name"].as_str().unwrap().to_string();
    tokio::fs::write(
      pipelines_dir.join(format!("{}.json", name)),
      serde_json::to_string_pretty(&pipeline).unwrap(),
    )
    .await
    .unwrap();
    tokio::fs::write(
      asset_dir.join("manifest.json"),
      serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .await
    .unwrap();

    Self {
      _dir: dir,
      pipelines_dir,
      asset_dir,
    }
  }

  pub fn deps(&self, backend: &Arc<MockBackend>, downloader: &Arc<FakeDownloader>) -> ExecutorDeps {
    ExecutorDeps {
      pipelines: Arc::new(FsPipelineLibrary::new(&self.pipelines_dir)),
      task_types: Arc::new(task_types()),
      lookups: Arc::new(lookups()),
      backend: backend.clone(),
      downloader: downloader.clone(),
    }
  }

  pub fn executor(
    &self,
    backend: &Arc<MockBackend>,
    downloader: &Arc<FakeDownloader>,
  ) -> PipelineExecutor {
    PipelineExecutor::new(self.deps(backend, downloader))
  }

  pub fn executor_with_notifier<N: ExecutionNotifier>(
    &self,
    backend: &Arc<MockBackend>,
    downloader: &Arc<FakeDownloader>,
    notifier: N,
  ) -> PipelineExecutor<N> {
    PipelineExecutor::with_notifier(self.deps(backend, downloader), notifier)
  }

  pub async fn manifest(&self) -> AssetManifest {
    kiln_manifest::load(&self.asset_dir).await.unwrap().unwrap()
  }

  pub async fn manifest_text(&self) -> String {
    tokio::fs::read_to_string(self.asset_dir.join("manifest.json"))
      .await
      .unwrap()
  }
}

/// Manifest with `tasks` replaced.
pub fn with_tasks(mut manifest: Value, tasks: Value) -> Value {
  manifest["tasks"] = tasks;
  manifest
}
