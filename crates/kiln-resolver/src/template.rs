//! `{{ variable|filter }}` substitution for binding paths, keys, and artifact paths.
//!
//! Rendering uses a minijinja environment with no built-in filters; only
//! `lowercase` and `uppercase` are available. Referencing a variable that is
//! not bound is an error rather than an empty string.

use std::sync::LazyLock;

use minijinja::{Environment, UndefinedBehavior, Value};

use crate::error::ResolveError;

static ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
  let mut env = Environment::empty();
  env.set_undefined_behavior(UndefinedBehavior::Strict);
  env.add_filter("lowercase", lowercase);
  env.add_filter("uppercase", uppercase);
  env
});

fn lowercase(value: Value) -> String {
  value.to_string().to_lowercase()
}

fn uppercase(value: Value) -> String {
  value.to_string().to_uppercase()
}

/// Render a template against iteration variables.
///
/// Strings without a `{{` placeholder are returned unchanged.
pub fn render_template(
  template: &str,
  vars: &serde_json::Map<String, serde_json::Value>,
) -> Result<String, ResolveError> {
  if !template.contains("{{") {
    return Ok(template.to_string());
  }

  ENV
    .render_str(template, Value::from_serialize(vars))
    .map_err(|e| ResolveError::Template {
      template: template.to_string(),
      message: e.to_string(),
    })
}
