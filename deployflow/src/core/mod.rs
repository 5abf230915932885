//! Core domain model types for deployflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Action, stage and execution statuses
//! - Artifacts and artifact paths
//! - Lifecycle and approval events
//! - Action output with factory methods

mod artifact;
mod event;
mod output;
mod status;

pub use artifact::{Artifact, ArtifactLocation, ArtifactPath};
pub use event::{ApprovalEvent, BusEvent, EventResource, LifecycleEventKind, PipelineEvent};
pub use output::ActionOutput;
pub use status::{ActionCategory, ActionStatus, ExecutionStatus};
