use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::input::{BoundInput, InputBinding};

/// One unit of work in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDef {
  pub id: String,
  /// Task type name, used to pick the remote endpoint and to key the manifest task state.
  pub task_type: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub depends_on: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub for_each: Option<ForEachDef>,
  #[serde(default)]
  pub inputs: BTreeMap<String, InputBinding>,
  /// Output name -> path into the terminal task response.
  #[serde(default)]
  pub outputs: BTreeMap<String, String>,
  /// Local file path (relative to the asset directory) -> path into the terminal task response.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub artifacts: BTreeMap<String, String>,
}

impl StepDef {
  pub fn is_iterated(&self) -> bool {
    self.for_each.is_some()
  }
}

/// Iteration clause expanding a step into one execution per array element.
///
/// ```json
/// {
///   "source": "manifest",
///   "path": "animations.names",
///   "as": "animation",
///   "idLookup": "animations",
///   "onItemFailure": "continue"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForEachDef {
  #[serde(flatten)]
  pub collection: CollectionSource,
  /// Iteration variable name the current element is bound to.
  #[serde(rename = "as")]
  pub var: String,
  /// Lookup table consulted for a numeric id of each item.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id_lookup: Option<String>,
  #[serde(default)]
  pub on_item_failure: ItemFailurePolicy,
}

/// Where the array iterated by a forEach clause lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CollectionSource {
  Manifest { path: String },
  Step { step: String, path: String },
}

impl CollectionSource {
  /// The equivalent input binding, so collections resolve like any other input.
  pub fn as_binding(&self) -> InputBinding {
    let bound = match self {
      CollectionSource::Manifest { path } => BoundInput::Manifest {
        path: path.clone(),
        default: None,
      },
      CollectionSource::Step { step, path } => BoundInput::Step {
        step: step.clone(),
        path: path.clone(),
        default: None,
      },
    };
    InputBinding::Bound(bound)
  }
}

/// What a failed forEach item means for the rest of the iteration and for
/// steps that depend on the iterated step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailurePolicy {
  /// Keep iterating. The step only counts as succeeded when every item succeeded.
  #[default]
  Continue,
  /// Keep iterating. The step counts as succeeded once iteration finishes.
  Tolerate,
  /// Stop at the first failed item. The step counts as failed.
  Halt,
}
