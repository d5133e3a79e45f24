//! Kiln Registry
//!
//! Read-only definitions the engine consults while running a pipeline:
//!
//! - [`TaskTypeRegistry`]: task type descriptors, their remote endpoints, and
//!   dependency-ordered chains between them.
//! - [`PipelineLibrary`]: named pipeline definitions, read fresh on every load.
//! - [`LookupTables`]: static name -> value tables, preloaded before a run or
//!   read once on first use.
//!
//! All of these are constructed up front and handed to the executor, so the
//! engine carries no process-global state.

mod error;
mod lookup;
mod pipelines;
mod task_types;

pub use error::RegistryError;
pub use lookup::{LookupTable, LookupTables};
pub use pipelines::{FsPipelineLibrary, PipelineLibrary};
pub use task_types::TaskTypeRegistry;
