//! Action trait and the actions of the backend pipeline.
//!
//! Actions are the units of work inside a stage. Each one calls a single
//! port and reports an [`ActionOutput`]; the runner turns that into
//! pipeline state and lifecycle events.

mod approval;
mod build;
mod context;
mod deploy;
mod preflight;
mod source;

pub use approval::ManualApprovalAction;
pub use build::BuildAction;
pub use context::{ActionContext, ExecutionScope};
pub use deploy::{EcsDeployAction, ScalingHook, ScalingHookAction};
pub use preflight::{stop_previous_executions, StopPreviousExecution};
pub use source::{GitSourceAction, ObjectSourceAction};

use crate::core::{ActionCategory, ActionOutput};
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline actions.
#[async_trait]
pub trait Action: Send + Sync + Debug {
    /// Returns the name of the action.
    fn name(&self) -> &str;

    /// Returns what kind of action this is.
    fn category(&self) -> ActionCategory;

    /// Artifacts the action reads.
    fn input_artifacts(&self) -> Vec<String> {
        Vec::new()
    }

    /// Artifacts the action produces.
    fn output_artifacts(&self) -> Vec<String> {
        Vec::new()
    }

    /// Executes the action.
    ///
    /// Failures are reported through the output, never by panicking.
    async fn execute(&self, ctx: &ActionContext) -> ActionOutput;
}
