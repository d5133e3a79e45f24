//! Input binding resolution.
//!
//! Each binding is resolved against a [`ResolveContext`]:
//!
//! ```json
//! {
//!   "art_style": "realistic",
//!   "prompt": { "source": "manifest", "path": "concept.prompt" },
//!   "model_task": { "source": "step", "step": "model", "path": "task_id" },
//!   "action_id": { "source": "lookup", "table": "animations", "key": "{{ animation }}" }
//! }
//! ```
//!
//! A binding that resolves to nothing (a missing path, a missing key, or JSON
//! `null`) falls back to its `default`. If there is no default the input is
//! left out of the request body altogether.

use std::collections::{BTreeMap, HashMap};

use kiln_config::{BoundInput, InputBinding};
use kiln_registry::LookupTables;
use serde_json::Value;

use crate::error::ResolveError;
use crate::path::JsonPath;
use crate::template::render_template;

/// Manifest path that resolves to the list of animations to generate.
pub const ANIMATION_LIST_PATH: &str = "animations.names";
/// Manifest path of the named animation preset.
pub const ANIMATION_PRESET_PATH: &str = "animations.preset";
/// Lookup table mapping preset names to animation lists.
pub const ANIMATION_PRESETS_TABLE: &str = "animation-presets";

/// Read access to the outputs of steps that have already succeeded.
pub trait StepOutputs {
  fn step_outputs(&self, step_id: &str) -> Option<&Value>;
}

impl StepOutputs for HashMap<String, Value> {
  fn step_outputs(&self, step_id: &str) -> Option<&Value> {
    self.get(step_id)
  }
}

/// Everything a binding may read from.
pub struct ResolveContext<'a> {
  /// The asset manifest as a JSON document.
  pub manifest: &'a Value,
  pub steps: &'a dyn StepOutputs,
  pub lookups: &'a LookupTables,
  /// forEach iteration variables.
  pub vars: &'a serde_json::Map<String, Value>,
}

/// Resolve a single binding. `Ok(None)` means undefined with no default.
pub fn resolve_binding(
  binding: &InputBinding,
  ctx: &ResolveContext<'_>,
) -> Result<Option<Value>, ResolveError> {
  let value = match binding {
    InputBinding::Literal(value) => Some(value.clone()),
    InputBinding::Bound(BoundInput::Literal { value }) => Some(value.clone()),
    InputBinding::Bound(BoundInput::Manifest { path, .. }) => {
      let path = render_template(path, ctx.vars)?;
      resolve_manifest_path(&path, ctx)?
    }
    InputBinding::Bound(BoundInput::Step { step, path, .. }) => {
      let path = JsonPath::parse(&render_template(path, ctx.vars)?)?;
      ctx
        .steps
        .step_outputs(step)
        .and_then(|outputs| path.lookup(outputs))
        .cloned()
    }
    InputBinding::Bound(BoundInput::Lookup { table, key, .. }) => {
      let key = render_template(key, ctx.vars)?;
      ctx.lookups.get(table, &key)
    }
  };

  Ok(
    value
      .filter(|v| !v.is_null())
      .or_else(|| binding.default_value().cloned()),
  )
}

/// Resolve every input of a step into a request body.
///
/// Inputs that resolve to nothing are omitted rather than sent as `null`.
pub fn resolve_inputs(
  step_id: &str,
  inputs: &BTreeMap<String, InputBinding>,
  ctx: &ResolveContext<'_>,
) -> Result<serde_json::Map<String, Value>, ResolveError> {
  let mut body = serde_json::Map::new();

  for (name, binding) in inputs {
    let value = resolve_binding(binding, ctx).map_err(|e| ResolveError::Input {
      step_id: step_id.to_string(),
      input: name.clone(),
      source: Box::new(e),
    })?;
    if let Some(value) = value {
      body.insert(name.clone(), value);
    }
  }

  Ok(body)
}

fn resolve_manifest_path(
  path: &str,
  ctx: &ResolveContext<'_>,
) -> Result<Option<Value>, ResolveError> {
  if path == ANIMATION_LIST_PATH {
    return resolve_animation_list(ctx);
  }
  Ok(JsonPath::parse(path)?.lookup(ctx.manifest).cloned())
}

/// An explicit, non-empty `animations.names` list wins over `animations.preset`.
fn resolve_animation_list(ctx: &ResolveContext<'_>) -> Result<Option<Value>, ResolveError> {
  let explicit = JsonPath::parse(ANIMATION_LIST_PATH)?.lookup(ctx.manifest);
  if let Some(Value::Array(names)) = explicit
    && !names.is_empty()
  {
    return Ok(Some(Value::Array(names.clone())));
  }

  let preset = JsonPath::parse(ANIMATION_PRESET_PATH)?
    .lookup(ctx.manifest)
    .and_then(|v| v.as_str());
  Ok(
    preset
      .and_then(|name| ctx.lookups.get(ANIMATION_PRESETS_TABLE, name))
      .filter(|v| v.is_array()),
  )
}
