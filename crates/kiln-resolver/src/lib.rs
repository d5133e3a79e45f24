//! Kiln Resolver
//!
//! Turns a step's declared input bindings into the concrete request body
//! sent to the remote backend.
//!
//! # Flow
//! 1. Templates in binding paths and keys are rendered against the current
//!    forEach iteration variables (`{{ animation|lowercase }}`).
//! 2. Each binding is read from its source: a literal, the manifest, a prior
//!    step's outputs, or a lookup table.
//! 3. Undefined values fall back to the binding's default, or are left out
//!    of the body entirely.

mod binding;
mod error;
mod path;
mod template;

pub use binding::{
  ANIMATION_LIST_PATH, ANIMATION_PRESET_PATH, ANIMATION_PRESETS_TABLE, ResolveContext,
  StepOutputs, resolve_binding, resolve_inputs,
};
pub use error::ResolveError;
pub use path::{JsonPath, Segment, extract};
pub use template::render_template;
