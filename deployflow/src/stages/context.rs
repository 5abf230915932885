//! Execution and action contexts.

use crate::cancellation::CancellationToken;
use crate::core::{Artifact, BusEvent, LifecycleEventKind, PipelineEvent};
use crate::events::NotificationBus;
use crate::pipeline::InMemoryOrchestrator;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// State shared by every action of one execution.
pub struct ExecutionScope {
    pipeline_name: String,
    execution_id: Uuid,
    artifacts: RwLock<HashMap<String, Artifact>>,
    bus: NotificationBus,
    cancel: Arc<CancellationToken>,
    registry: Arc<InMemoryOrchestrator>,
}

impl ExecutionScope {
    /// Creates a scope for one execution.
    #[must_use]
    pub fn new(
        pipeline_name: impl Into<String>,
        execution_id: Uuid,
        bus: NotificationBus,
        cancel: Arc<CancellationToken>,
        registry: Arc<InMemoryOrchestrator>,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            execution_id,
            artifacts: RwLock::new(HashMap::new()),
            bus,
            cancel,
            registry,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Returns the execution id.
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Returns the notification bus.
    #[must_use]
    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Returns the execution's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Returns the execution registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<InMemoryOrchestrator> {
        &self.registry
    }

    /// Looks up an artifact produced earlier in this execution.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<Artifact> {
        self.artifacts.read().get(name).cloned()
    }

    /// Stores an artifact under its name.
    pub fn put_artifact(&self, artifact: Artifact) {
        self.artifacts.write().insert(artifact.name.clone(), artifact);
    }

    /// Returns the names of all stored artifacts, sorted.
    #[must_use]
    pub fn artifact_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.artifacts.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ExecutionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionScope")
            .field("pipeline_name", &self.pipeline_name)
            .field("execution_id", &self.execution_id)
            .field("artifacts", &self.artifact_names())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// The context for a single action attempt.
#[derive(Debug, Clone)]
pub struct ActionContext {
    scope: Arc<ExecutionScope>,
    stage_name: String,
    action_name: String,
    action_execution_id: String,
}

impl ActionContext {
    /// Creates a context for a fresh attempt of an action.
    #[must_use]
    pub fn new(scope: Arc<ExecutionScope>, stage_name: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            scope,
            stage_name: stage_name.into(),
            action_name: action_name.into(),
            action_execution_id: Uuid::new_v4().to_string(),
        }
    }

    /// Returns the execution scope.
    #[must_use]
    pub fn scope(&self) -> &Arc<ExecutionScope> {
        &self.scope
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        self.scope.pipeline_name()
    }

    /// Returns the execution id.
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.scope.execution_id()
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the action name.
    #[must_use]
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    /// Returns the id of this attempt.
    #[must_use]
    pub fn action_execution_id(&self) -> &str {
        &self.action_execution_id
    }

    /// Looks up an input artifact.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<Artifact> {
        self.scope.artifact(name)
    }

    /// Returns the execution's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        self.scope.cancel_token()
    }

    /// Returns whether the execution has been asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.scope.cancel_token().is_cancelled()
    }

    /// Builds a pipeline-scoped lifecycle event naming this stage and action.
    #[must_use]
    pub fn lifecycle_event(&self, kind: LifecycleEventKind) -> PipelineEvent {
        PipelineEvent::pipeline(kind, self.pipeline_name(), self.execution_id())
            .with_stage(&self.stage_name)
            .with_action(&self.action_name)
    }

    /// Publishes an event on the notification bus.
    pub fn publish(&self, event: BusEvent) {
        self.scope.bus().publish(event);
    }
}
