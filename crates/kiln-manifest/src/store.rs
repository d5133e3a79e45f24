//! Whole-file manifest persistence.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::ManifestError;
use crate::manifest::AssetManifest;

/// File name of the manifest inside an asset directory.
pub const MANIFEST_FILE: &str = "manifest.json";

pub fn manifest_path(asset_dir: &Path) -> PathBuf {
  asset_dir.join(MANIFEST_FILE)
}

/// Read the manifest of an asset directory. Returns `None` if there is none.
pub async fn load(asset_dir: &Path) -> Result<Option<AssetManifest>, ManifestError> {
  let path = manifest_path(asset_dir);
  let content = match fs::read_to_string(&path).await {
    Ok(content) => content,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(source) => return Err(ManifestError::Read { path, source }),
  };

  let manifest =
    serde_json::from_str(&content).map_err(|source| ManifestError::Parse { path, source })?;
  Ok(Some(manifest))
}

/// Replace the manifest of an asset directory.
///
/// The document is written to a sibling temp file and renamed into place,
/// so readers never observe a partially written manifest.
pub async fn save(asset_dir: &Path, manifest: &AssetManifest) -> Result<(), ManifestError> {
  let path = manifest_path(asset_dir);
  let tmp_path = asset_dir.join(format!("{}.tmp", MANIFEST_FILE));

  let mut content = serde_json::to_string_pretty(manifest)?;
  content.push('\n');

  fs::write(&tmp_path, content)
    .await
    .map_err(|source| ManifestError::Write {
      path: tmp_path.clone(),
      source,
    })?;
  fs::rename(&tmp_path, &path)
    .await
    .map_err(|source| ManifestError::Write { path, source })
}
