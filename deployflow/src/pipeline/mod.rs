//! Pipeline definition and execution.
//!
//! This module provides:
//! - Stage and action specifications with run orders
//! - A builder that validates the topology
//! - The execution engine and its in-memory registry
//! - Assembly of the backend deployment pipeline

mod backend;
mod builder;
mod execution;
mod orchestrator;
mod runner;
mod spec;


pub use backend::{
    BackendPipeline, APPROVAL_STAGE, BUILD_STAGE, DEPLOY_STAGE, PREFLIGHT_STAGE, SOURCE_STAGE,
};
pub use builder::PipelineBuilder;
pub use execution::{ActionResult, ExecutionTrigger, PipelineExecution, StageResult};
pub use orchestrator::{InMemoryOrchestrator, StageLayout};
pub use runner::{ExecutionHandle, PipelineRunner};
pub use spec::{ActionSpec, PipelineDefinition, StageSpec};
