//! Error types for pipeline execution.

use std::path::PathBuf;

use kiln_manifest::ManifestError;
use kiln_registry::RegistryError;
use kiln_remote::RemoteError;
use kiln_resolver::ResolveError;
use thiserror::Error;

/// Errors that abort a pipeline run.
///
/// A remote task ending FAILED or CANCELED is not an error: it is recorded in
/// the manifest and the run moves on.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("pipeline not found: {0}")]
  PipelineNotFound(String),

  #[error("manifest not found: {}", .0.display())]
  ManifestNotFound(PathBuf),

  #[error("step '{step_id}' not found in pipeline '{pipeline}'")]
  StepNotFound { pipeline: String, step_id: String },

  /// The pipeline definition is inconsistent.
  #[error("invalid pipeline '{pipeline}': {message}")]
  InvalidPipeline { pipeline: String, message: String },

  /// A forEach collection resolved to something other than an array.
  #[error("forEach collection of step '{step_id}' is not an array (found {found})")]
  ForEachNotArray { step_id: String, found: String },

  #[error("step '{step_id}' depends on '{dependency}', which has not completed")]
  DependencyNotCompleted { step_id: String, dependency: String },

  /// A declared artifact cannot be materialized.
  #[error("invalid artifact '{path}' for step '{step_id}': {message}")]
  InvalidArtifact {
    step_id: String,
    path: String,
    message: String,
  },

  #[error("failed to download {url} for step '{step_id}': {source}")]
  Download {
    step_id: String,
    url: String,
    #[source]
    source: RemoteError,
  },

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Remote(#[from] RemoteError),
}
