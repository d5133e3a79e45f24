//! Resolver error types.

/// Errors that can occur while resolving step inputs.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
  /// A declared path does not follow the `field.field[index]` grammar.
  #[error("invalid path '{path}': {reason}")]
  InvalidPath { path: String, reason: String },

  /// A template failed to render, e.g. it references an unbound variable.
  #[error("failed to render template '{template}': {message}")]
  Template { template: String, message: String },

  /// Resolving one named input failed.
  #[error("failed to resolve input '{input}' of step '{step_id}': {source}")]
  Input {
    step_id: String,
    input: String,
    #[source]
    source: Box<ResolveError>,
  },
}
