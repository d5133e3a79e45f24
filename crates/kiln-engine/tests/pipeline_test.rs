mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::*;
use kiln_engine::{ChannelNotifier, EngineError, ExecuteOptions, ExecutionEvent};
use kiln_manifest::TaskStatus;
use kiln_registry::RegistryError;
use serde_json::json;

fn run_step(step: &str) -> ExecuteOptions {
  ExecuteOptions {
    step: Some(step.to_string()),
  }
}

#[tokio::test]
async fn test_full_character_run() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  let summary = fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap();

  assert_eq!(
    summary.submitted,
    vec!["concept", "model", "rig", "animations[idle]", "animations[walk]"]
  );
  assert!(summary.failed.is_empty());

  let model = &backend.submitted_to(MODEL_ENDPOINT)[0];
  assert_eq!(model["image_url"], json!("https://cdn/concept-a.png"));
  let rig = &backend.submitted_to(RIG_ENDPOINT)[0];
  assert_eq!(rig["input_task_id"], json!("task-2"));
  let animations = backend.submitted_to(ANIMATION_ENDPOINT);
  assert_eq!(animations[0]["rig_task_id"], json!("task-3"));
  assert_eq!(animations[0]["action_id"], json!(0));
  assert_eq!(animations[1]["action_id"], json!(1));

  let manifest = fixture.manifest().await;
  for task_type in ["concept", "model", "rig"] {
    assert_eq!(
      manifest.task(task_type).unwrap().status,
      TaskStatus::Succeeded,
      "{task_type}"
    );
  }
  let items = manifest.items("animation");
  assert_eq!(items.len(), 2);
  assert_eq!(items[1].item.as_deref(), Some("walk"));
  assert_eq!(items[1].item_id, Some(1));
  assert_eq!(
    items[1].artifacts.get("animations/walk").map(String::as_str),
    Some("animations/walk.glb")
  );
  assert!(fixture.asset_dir.join("animations/walk.glb").exists());
  assert!(fixture.asset_dir.join("model.glb").exists());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let downloader = Arc::new(FakeDownloader::default());

  let first = Arc::new(MockBackend::new());
  fixture
    .executor(&first, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap();
  let after_first = fixture.manifest_text().await;

  let second = Arc::new(MockBackend::new());
  let summary = fixture
    .executor(&second, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap();

  assert!(second.submissions().is_empty());
  assert!(summary.submitted.is_empty());
  assert_eq!(summary.skipped, vec!["concept", "model", "rig", "animations"]);
  assert_eq!(fixture.manifest_text().await, after_first);
}

#[tokio::test]
async fn test_seed_is_generated_once_and_sent_everywhere() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, run_step("concept"))
    .await
    .unwrap();
  let seed = fixture.manifest().await.seed.unwrap();

  fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap();

  assert_eq!(fixture.manifest().await.seed, Some(seed));
  let submissions = backend.submissions();
  assert_eq!(submissions.len(), 5);
  for submission in submissions {
    assert_eq!(submission.body["seed"], json!(seed), "{}", submission.endpoint);
  }
}

#[tokio::test]
async fn test_existing_seed_is_kept() {
  let mut manifest = knight_manifest();
  manifest["seed"] = json!(42);
  let fixture = Fixture::new(character_pipeline(), manifest).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, run_step("concept"))
    .await
    .unwrap();

  assert_eq!(fixture.manifest().await.seed, Some(42));
  assert_eq!(backend.submitted_to(CONCEPT_ENDPOINT)[0]["seed"], json!(42));
}

#[tokio::test]
async fn test_undefined_inputs_are_omitted() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, run_step("concept"))
    .await
    .unwrap();

  let body = &backend.submitted_to(CONCEPT_ENDPOINT)[0];
  let mut keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
  keys.sort_unstable();
  assert_eq!(keys, vec!["art_style", "prompt", "seed"]);
  assert_eq!(body["prompt"], json!("armored knight, t-pose"));
}

#[tokio::test]
async fn test_artifact_arrays_fan_out() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, run_step("concept"))
    .await
    .unwrap();

  let concept = fixture.manifest().await.task("concept").cloned().unwrap();
  assert_eq!(
    concept.artifacts,
    [
      ("concept_0".to_string(), "concept_0.png".to_string()),
      ("concept_1".to_string(), "concept_1.png".to_string()),
    ]
    .into_iter()
    .collect::<BTreeMap<_, _>>()
  );
  let written = tokio::fs::read_to_string(fixture.asset_dir.join("concept_1.png"))
    .await
    .unwrap();
  assert_eq!(written, "https://cdn/concept-b.png");
  assert_eq!(downloader.downloads().len(), 2);
}

#[tokio::test]
async fn test_binary_payloads_never_reach_the_manifest() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap();

  let model = fixture.manifest().await.task("model").cloned().unwrap();
  assert!(model.outputs.contains_key("model_url"));
  assert!(!model.outputs.contains_key("preview"));
  assert!(!fixture.manifest_text().await.contains("base64"));
}

#[tokio::test]
async fn test_resume_skips_succeeded_steps() {
  let tasks = json!({
    "concept": {
      "taskId": "t-concept",
      "status": "SUCCEEDED",
      "outputs": { "image_url": "https://cdn/earlier.png" }
    }
  });
  let fixture = Fixture::new(character_pipeline(), with_tasks(knight_manifest(), tasks)).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  let summary = fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap();

  assert_eq!(summary.skipped, vec!["concept"]);
  assert!(backend.submitted_to(CONCEPT_ENDPOINT).is_empty());
  assert_eq!(
    backend.submitted_to(MODEL_ENDPOINT)[0]["image_url"],
    json!("https://cdn/earlier.png")
  );
}

#[tokio::test]
async fn test_single_step_requires_completed_dependencies() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  let err = fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, run_step("model"))
    .await
    .unwrap_err();

  match err {
    EngineError::DependencyNotCompleted {
      step_id,
      dependency,
    } => {
      assert_eq!(step_id, "model");
      assert_eq!(dependency, "concept");
    }
    other => panic!("unexpected error: {other}"),
  }
  assert!(backend.submissions().is_empty());
}

#[tokio::test]
async fn test_single_step_runs_after_dependencies() {
  let tasks = json!({
    "concept": { "taskId": "t-concept", "status": "SUCCEEDED", "outputs": { "image_url": "https://cdn/c.png" } }
  });
  let fixture = Fixture::new(character_pipeline(), with_tasks(knight_manifest(), tasks)).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  let summary = fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, run_step("model"))
    .await
    .unwrap();

  assert_eq!(summary.submitted, vec!["model"]);
  assert!(fixture.manifest().await.task("rig").is_none());
}

#[tokio::test]
async fn test_unknown_step() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  let err = fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, run_step("texture"))
    .await
    .unwrap_err();

  assert!(matches!(err, EngineError::StepNotFound { .. }));
}

#[tokio::test]
async fn test_failed_task_is_recorded_and_blocks_dependents() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let downloader = Arc::new(FakeDownloader::default());
  let backend = Arc::new(
    MockBackend::new().fail_when("image_url", json!("https://cdn/concept-a.png")),
  );

  let err = fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap_err();

  match err {
    EngineError::DependencyNotCompleted {
      step_id,
      dependency,
    } => {
      assert_eq!(step_id, "rig");
      assert_eq!(dependency, "model");
    }
    other => panic!("unexpected error: {other}"),
  }
  assert!(backend.submitted_to(RIG_ENDPOINT).is_empty());

  let model = fixture.manifest().await.task("model").cloned().unwrap();
  assert_eq!(model.status, TaskStatus::Failed);
  assert_eq!(model.error.as_deref(), Some("generation failed"));
  assert!(model.completed_at.is_some());

  // a rerun retries the failed step
  let healthy = Arc::new(MockBackend::new());
  let summary = fixture
    .executor(&healthy, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap();
  assert_eq!(summary.skipped, vec!["concept"]);
  assert_eq!(summary.submitted[0], "model");
}

#[tokio::test]
async fn test_in_flight_task_is_reattached() {
  let tasks = json!({
    "concept": { "taskId": "remote-7", "status": "IN_PROGRESS" }
  });
  let fixture = Fixture::new(character_pipeline(), with_tasks(knight_manifest(), tasks)).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  let summary = fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, run_step("concept"))
    .await
    .unwrap();

  assert_eq!(summary.reattached, vec!["concept"]);
  assert!(backend.submissions().is_empty());
  assert_eq!(backend.polls(), vec!["remote-7"]);

  let concept = fixture.manifest().await.task("concept").cloned().unwrap();
  assert_eq!(concept.status, TaskStatus::Succeeded);
  assert_eq!(concept.task_id.as_deref(), Some("remote-7"));
}

#[tokio::test]
async fn test_download_failure_aborts_and_resumes() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());

  let err = fixture
    .executor(&backend, &Arc::new(FakeDownloader::failing()))
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::Download { .. }));

  let concept = fixture.manifest().await.task("concept").cloned().unwrap();
  assert_eq!(concept.status, TaskStatus::InProgress);
  assert_eq!(concept.task_id.as_deref(), Some("task-1"));

  let resumed = Arc::new(MockBackend::new());
  let summary = fixture
    .executor(&resumed, &Arc::new(FakeDownloader::default()))
    .execute("character", &fixture.asset_dir, run_step("concept"))
    .await
    .unwrap();
  assert_eq!(summary.reattached, vec!["concept"]);
  assert!(resumed.submissions().is_empty());
  assert!(fixture.asset_dir.join("concept_0.png").exists());
}

#[tokio::test]
async fn test_unknown_pipeline() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  let err = fixture
    .executor(&backend, &downloader)
    .execute("prop", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap_err();

  assert!(matches!(err, EngineError::PipelineNotFound(name) if name == "prop"));
}

#[tokio::test]
async fn test_missing_manifest() {
  let fixture = Fixture::new(character_pipeline(), knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());
  let empty = fixture.asset_dir.parent().unwrap().join("empty");

  let err = fixture
    .executor(&backend, &downloader)
    .execute("character", &empty, ExecuteOptions::default())
    .await
    .unwrap_err();

  assert!(matches!(err, EngineError::ManifestNotFound(_)));
  assert!(!empty.exists());
}

#[tokio::test]
async fn test_invalid_pipelines_fail_before_submitting() {
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());

  let unknown_dependency = json!({
    "name": "character",
    "steps": [
      { "id": "model", "taskType": "model", "dependsOn": ["sketch"] }
    ]
  });
  let fixture = Fixture::new(unknown_dependency, knight_manifest()).await;
  let err = fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::InvalidPipeline { .. }));

  let duplicate = json!({
    "name": "character",
    "steps": [concept_step(), concept_step()]
  });
  let fixture = Fixture::new(duplicate, knight_manifest()).await;
  let err = fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::InvalidPipeline { .. }));

  let unknown_type = json!({
    "name": "character",
    "steps": [{ "id": "texture", "taskType": "texture" }]
  });
  let fixture = Fixture::new(unknown_type, knight_manifest()).await;
  let err = fixture
    .executor(&backend, &downloader)
    .execute("character", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    EngineError::Registry(RegistryError::UnknownTaskType(name)) if name == "texture"
  ));

  assert!(backend.submissions().is_empty());
}

#[tokio::test]
async fn test_events_follow_the_run() {
  let pipeline = json!({ "name": "sketch", "steps": [concept_step()] });
  let fixture = Fixture::new(pipeline, knight_manifest()).await;
  let backend = Arc::new(MockBackend::new());
  let downloader = Arc::new(FakeDownloader::default());
  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

  let summary = fixture
    .executor_with_notifier(&backend, &downloader, ChannelNotifier::new(tx))
    .execute("sketch", &fixture.asset_dir, ExecuteOptions::default())
    .await
    .unwrap();

  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }

  let names: Vec<&str> = events
    .iter()
    .map(|event| match event {
      ExecutionEvent::RunStarted { .. } => "run_started",
      ExecutionEvent::SeedGenerated { .. } => "seed_generated",
      ExecutionEvent::StepStarted { .. } => "step_started",
      ExecutionEvent::TaskSubmitted { .. } => "task_submitted",
      ExecutionEvent::ArtifactSaved { .. } => "artifact_saved",
      ExecutionEvent::TaskSucceeded { .. } => "task_succeeded",
      ExecutionEvent::RunCompleted { .. } => "run_completed",
      _ => "other",
    })
    .collect();
  assert_eq!(
    names,
    vec![
      "run_started",
      "seed_generated",
      "step_started",
      "task_submitted",
      "artifact_saved",
      "artifact_saved",
      "task_succeeded",
      "run_completed",
    ]
  );
  assert!(matches!(
    &events[7],
    ExecutionEvent::RunCompleted { run_id } if *run_id == summary.run_id
  ));
}
