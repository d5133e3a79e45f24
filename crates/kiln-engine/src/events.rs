//! Execution events and notifiers.
//!
//! The executor reports progress through an [`ExecutionNotifier`]. The
//! manifest stays the source of truth; events are for observers such as a
//! progress display or tests.

use kiln_manifest::TaskStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  RunStarted {
    run_id: String,
    pipeline: String,
    asset_id: String,
  },

  /// A reproducibility seed was generated and persisted for the asset.
  SeedGenerated { run_id: String, seed: u32 },

  StepStarted { run_id: String, step_id: String },

  /// The step was already SUCCEEDED.
  StepSkipped { run_id: String, step_id: String },

  /// A forEach item was already SUCCEEDED.
  ItemSkipped {
    run_id: String,
    step_id: String,
    item: String,
  },

  TaskSubmitted {
    run_id: String,
    step_id: String,
    item: Option<String>,
    task_id: String,
  },

  /// A persisted in-flight task is being polled again instead of resubmitted.
  TaskReattached {
    run_id: String,
    step_id: String,
    item: Option<String>,
    task_id: String,
  },

  TaskSucceeded {
    run_id: String,
    step_id: String,
    item: Option<String>,
    task_id: String,
  },

  /// The remote task ended FAILED or CANCELED.
  TaskFailed {
    run_id: String,
    step_id: String,
    item: Option<String>,
    task_id: String,
    status: TaskStatus,
    error: Option<String>,
  },

  ArtifactSaved {
    run_id: String,
    step_id: String,
    path: String,
  },

  RunCompleted { run_id: String },

  RunFailed { run_id: String, error: String },
}

/// Receives execution events.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls a run. Volume is a handful of
/// events per task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
