//! Ports - contracts for the managed services a pipeline drives.
//!
//! Each service gets its own narrow trait so an action only depends on
//! what it calls. [`Ports`] bundles one implementation of each for
//! pipeline assembly.

mod chat;
mod delivery;
mod orchestration;
mod source;

pub use chat::{ChatClient, ChatMessage, ChatReceipt};
#[cfg(test)]
pub use chat::MockChatClient;
pub use delivery::{
    AutoscalingControl, BuildInvoker, BuildReport, BuildRequest, DeployInvoker, DeployRequest,
    DeploymentConfig, DeploymentReport, EcsTarget,
};
pub use orchestration::{
    ActionExecution, ActionState, ExecutionSummary, OrchestrationService, PipelineState, StageState,
};
pub use source::{GitCheckout, GitRevision, GitSourceProvider, ObjectSourceProvider, StoredObject};

use crate::secrets::SecretStore;
use std::sync::Arc;

/// One implementation of every port.
#[derive(Clone)]
pub struct Ports {
    /// Secret store.
    pub secrets: Arc<dyn SecretStore>,
    /// Orchestration service.
    pub orchestration: Arc<dyn OrchestrationService>,
    /// Source-control host.
    pub git: Arc<dyn GitSourceProvider>,
    /// Object storage.
    pub objects: Arc<dyn ObjectSourceProvider>,
    /// Build service.
    pub build: Arc<dyn BuildInvoker>,
    /// Deployment service.
    pub deploy: Arc<dyn DeployInvoker>,
    /// Application autoscaling.
    pub autoscaling: Arc<dyn AutoscalingControl>,
    /// Chat service.
    pub chat: Arc<dyn ChatClient>,
}

impl std::fmt::Debug for Ports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ports").finish_non_exhaustive()
    }
}
