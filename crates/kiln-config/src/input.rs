//! Input binding types for pipeline step configuration.
//!
//! An input binding tells the engine where the value for one request field
//! comes from. A bare JSON value is passed through as a literal; an object
//! carrying a `source` tag is resolved at runtime.
//!
//! # Examples
//!
//! ```json
//! {
//!   "art_style": "realistic",
//!   "prompt": { "source": "manifest", "path": "concept.prompt" },
//!   "image_url": { "source": "step", "step": "concept", "path": "image_urls[0]" },
//!   "action_id": { "source": "lookup", "table": "animations", "key": "{{ animation|lowercase }}" },
//!   "topology": { "source": "manifest", "path": "model.topology", "default": "quad" }
//! }
//! ```
//!
//! Paths and keys may contain `{{ variable }}` placeholders which are rendered
//! against the current forEach iteration variables.
//!
//! Any object with a `source` key is a binding. A malformed one is a parse
//! error, so it never reaches the backend as a literal.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Declarative rule for resolving one step input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InputBinding {
  /// A binding with an explicit `source`.
  Bound(BoundInput),
  /// Any other JSON value, used as-is.
  Literal(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case", deny_unknown_fields)]
pub enum BoundInput {
  /// Explicit literal, useful when the literal itself is an object with a `source` key.
  Literal { value: serde_json::Value },

  /// Dot-path into the asset manifest.
  Manifest {
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<serde_json::Value>,
  },

  /// Dot-path into the outputs of a previously completed step.
  Step {
    step: String,
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<serde_json::Value>,
  },

  /// Key into a named lookup table.
  Lookup {
    table: String,
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<serde_json::Value>,
  },
}

impl<'de> Deserialize<'de> for InputBinding {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let is_bound = value
      .as_object()
      .is_some_and(|map| map.contains_key("source"));

    if is_bound {
      BoundInput::deserialize(value)
        .map(InputBinding::Bound)
        .map_err(D::Error::custom)
    } else {
      Ok(InputBinding::Literal(value))
    }
  }
}

impl InputBinding {
  /// The declared fallback used when the binding resolves to nothing.
  pub fn default_value(&self) -> Option<&serde_json::Value> {
    match self {
      InputBinding::Literal(_) => None,
      InputBinding::Bound(bound) => match bound {
        BoundInput::Literal { .. } => None,
        BoundInput::Manifest { default, .. }
        | BoundInput::Step { default, .. }
        | BoundInput::Lookup { default, .. } => default.as_ref(),
      },
    }
  }
}
