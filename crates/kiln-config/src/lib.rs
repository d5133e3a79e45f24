//! Kiln Config
//!
//! This crate contains the serializable configuration types for Kiln.
//! These types describe pipelines and task types as they are stored on disk,
//! before the engine validates them against the task type registry.
//!
//! Configuration is loaded from JSON documents:
//! - `pipelines/<name>.json` for [`PipelineDef`]
//! - `task-types/<name>.json` for [`TaskTypeDef`]
//!
//! The engine reads these types fresh on every invocation and never mutates them.

mod input;
mod pipeline;
mod step;
mod task_type;

pub use input::{BoundInput, InputBinding};
pub use pipeline::PipelineDef;
pub use step::{CollectionSource, ForEachDef, ItemFailurePolicy, StepDef};
pub use task_type::TaskTypeDef;
