//! # Deployflow
//!
//! The backend deployment pipeline of a containerised service, driven
//! in-process against async service contracts.
//!
//! Deployflow provides:
//!
//! - **Validated configuration**: per-environment pipeline parameters checked at construction
//! - **Stage topology**: Source, pre-flight, approval, build and deploy stages with run orders
//! - **Execution engine**: sequential stages, concurrent run-order groups, cooperative stop
//! - **Approval gate**: pending approvals resolved by chat button replies
//! - **Notification fan-out**: lifecycle and approval notifiers on a publish/subscribe bus
//! - **Trigger rule**: push events start the pipeline for the configured branch
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deployflow::prelude::*;
//!
//! let config = PipelineConfig::from_json_file("pipeline.dev.json")?;
//! let settings = RunnerSettings::from_env()?;
//! let pipeline = BackendPipeline::assemble(&config, &settings, ports, registry).await?;
//!
//! if let Some(handle) = pipeline.on_event(&InboundEvent::from_json_str(body)?) {
//!     let execution = handle.wait().await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod approval;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod secrets;
pub mod stages;
pub mod testing;
pub mod trigger;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::approval::{ApprovalDecision, ApprovalResponder, ApprovalService, ApprovalState};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{Environment, PipelineConfig, RunnerSettings};
    pub use crate::core::{
        ActionOutput, ActionStatus, Artifact, BusEvent, ExecutionStatus, LifecycleEventKind, PipelineEvent,
    };
    pub use crate::errors::{ConfigError, DeployflowError, NotifyError, ServiceError};
    pub use crate::events::{EventSink, LoggingEventSink, NotificationBus};
    pub use crate::notify::{ApprovalNotifier, LifecycleNotifier, NotificationRule};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        BackendPipeline, ExecutionHandle, ExecutionTrigger, InMemoryOrchestrator, PipelineBuilder,
        PipelineExecution, PipelineRunner, StageSpec,
    };
    pub use crate::ports::Ports;
    pub use crate::secrets::{SecretResolver, SecretString};
    pub use crate::stages::Action;
    pub use crate::trigger::{InboundEvent, TriggerRule};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
