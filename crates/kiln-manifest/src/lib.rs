//! Kiln Manifest
//!
//! This crate provides the asset manifest: the single durable record for one
//! generated asset. It holds the asset's identity, its reproducibility seed,
//! free-form per-task-type configuration blocks, and the execution state of
//! every task run against it.
//!
//! The manifest lives at `{asset_dir}/manifest.json`. It is read once at the
//! start of a run and rewritten in full after every unit of work, so a crash
//! never loses completed work. See [`load`] and [`save`].

mod error;
mod manifest;
mod payload;
mod state;
mod store;

pub use error::ManifestError;
pub use manifest::AssetManifest;
pub use payload::is_binary_payload;
pub use state::{TaskEntry, TaskState, TaskStatus};
pub use store::{MANIFEST_FILE, load, manifest_path, save};
