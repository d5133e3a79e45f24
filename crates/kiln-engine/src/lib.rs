//! Pipeline execution for kiln.
//!
//! This crate provides the [`PipelineExecutor`] which handles:
//! - Pipeline validation against the task type registry
//! - Dependency gating between steps
//! - forEach expansion with per-item resumability
//! - Artifact downloads and output extraction
//! - Writing every state transition to the asset manifest
//!
//! Runs are sequential. A killed run is resumed by running it again: work
//! already recorded as SUCCEEDED is skipped and in-flight remote tasks are
//! re-attached instead of resubmitted.

mod artifacts;
mod context;
mod error;
mod events;
mod executor;
mod foreach;
mod result;

pub use context::{ExecutionContext, StepResults};
pub use error::EngineError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{ExecuteOptions, ExecutorDeps, PipelineExecutor};
pub use foreach::item_key;
pub use result::{RunSummary, StepResult};
