//! Mapping of task response values to local artifact files.

use std::path::{Component, Path};

use serde_json::Value;

use crate::error::EngineError;

/// Local files to download for one declared artifact, as
/// `(relative path, url)` pairs.
///
/// A string value is one file at `local_path`. An array fans out to
/// `base_0.ext`, `base_1.ext`, and so on.
pub(crate) fn plan(
  step_id: &str,
  local_path: &str,
  value: &Value,
) -> Result<Vec<(String, String)>, EngineError> {
  let invalid = |message: String| EngineError::InvalidArtifact {
    step_id: step_id.to_string(),
    path: local_path.to_string(),
    message,
  };

  if !is_contained(local_path) {
    return Err(invalid("path must be relative to the asset directory".to_string()));
  }

  match value {
    Value::String(url) => Ok(vec![(local_path.to_string(), url.clone())]),
    Value::Array(urls) => urls
      .iter()
      .enumerate()
      .map(|(index, url)| match url {
        Value::String(url) => Ok((indexed_path(local_path, index), url.clone())),
        other => Err(invalid(format!("element {} is not a url: {}", index, other))),
      })
      .collect(),
    other => Err(invalid(format!("expected a url or a list of urls, got {}", other))),
  }
}

/// `renders/concept.png` + 1 -> `renders/concept_1.png`.
pub(crate) fn indexed_path(path: &str, index: usize) -> String {
  let (dir, file) = match path.rfind('/') {
    Some(slash) => path.split_at(slash + 1),
    None => ("", path),
  };
  match file.rfind('.') {
    Some(dot) if dot > 0 => format!("{}{}_{}{}", dir, &file[..dot], index, &file[dot..]),
    _ => format!("{}{}_{}", dir, file, index),
  }
}

/// Manifest key of an artifact: its relative path without the extension.
pub(crate) fn artifact_name(path: &str) -> String {
  let file_start = path.rfind('/').map_or(0, |slash| slash + 1);
  match path[file_start..].rfind('.') {
    Some(dot) if dot > 0 => path[..file_start + dot].to_string(),
    _ => path.to_string(),
  }
}

fn is_contained(path: &str) -> bool {
  !path.is_empty()
    && Path::new(path)
      .components()
      .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
