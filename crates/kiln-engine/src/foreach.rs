//! forEach expansion.
//!
//! A step with a `forEach` clause runs once per element of an array. Each
//! element is identified by its [`item_key`], which is also how its record is
//! found in the manifest on resume.

use kiln_config::{ForEachDef, ItemFailurePolicy, StepDef};
use kiln_manifest::AssetManifest;
use kiln_registry::LookupTables;
use kiln_resolver::{ResolveContext, resolve_binding};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::EngineError;

/// Case-normalized identifier of a forEach element.
///
/// Strings are used as-is, anything else by its JSON text. Both are lowercased.
pub fn item_key(value: &Value) -> String {
  match value {
    Value::String(s) => s.to_lowercase(),
    other => other.to_string().to_lowercase(),
  }
}

/// One element of a forEach collection.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Item {
  pub key: String,
  pub value: Value,
  /// Numeric id from the clause's `idLookup` table.
  pub id: Option<i64>,
}

impl Item {
  pub(crate) fn new(value: Value, for_each: &ForEachDef, lookups: &LookupTables) -> Self {
    let key = item_key(&value);
    let id = for_each
      .id_lookup
      .as_deref()
      .and_then(|table| lookups.get(table, &key))
      .and_then(|v| v.as_i64());
    Self { key, value, id }
  }

  /// Template variables while this item executes.
  pub(crate) fn vars(&self, for_each: &ForEachDef) -> serde_json::Map<String, Value> {
    let mut vars = serde_json::Map::new();
    vars.insert(for_each.var.clone(), self.value.clone());
    vars
  }

  pub(crate) fn label(&self, step_id: &str) -> String {
    format!("{}[{}]", step_id, self.key)
  }
}

/// Resolve the array a forEach clause iterates over.
pub(crate) fn resolve_collection(
  step: &StepDef,
  for_each: &ForEachDef,
  ctx: &ExecutionContext,
  lookups: &LookupTables,
) -> Result<Vec<Value>, EngineError> {
  let manifest = ctx.manifest.to_value()?;
  let resolve_ctx = ResolveContext {
    manifest: &manifest,
    steps: &ctx.results,
    lookups,
    vars: &ctx.vars,
  };

  match resolve_binding(&for_each.collection.as_binding(), &resolve_ctx)? {
    Some(Value::Array(items)) => Ok(items),
    other => Err(EngineError::ForEachNotArray {
      step_id: step.id.clone(),
      found: describe(other.as_ref()).to_string(),
    }),
  }
}

/// Whether every element of `items` has a finished record, per the clause's
/// failure policy.
pub(crate) fn iteration_complete(
  for_each: &ForEachDef,
  items: &[Value],
  manifest: &AssetManifest,
  task_type: &str,
) -> bool {
  items.iter().all(|value| {
    let Some(state) = manifest.find_item(task_type, &item_key(value)) else {
      return false;
    };
    match for_each.on_item_failure {
      ItemFailurePolicy::Tolerate => state.status.is_terminal(),
      ItemFailurePolicy::Continue | ItemFailurePolicy::Halt => state.is_succeeded(),
    }
  })
}

fn describe(value: Option<&Value>) -> &'static str {
  match value {
    None => "nothing",
    Some(Value::Null) => "null",
    Some(Value::Bool(_)) => "a boolean",
    Some(Value::Number(_)) => "a number",
    Some(Value::String(_)) => "a string",
    Some(Value::Array(_)) => "an array",
    Some(Value::Object(_)) => "an object",
  }
}
