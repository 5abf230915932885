//! Lifecycle and approval events published while a pipeline runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kinds of lifecycle events a pipeline or build project emits.
///
/// Each kind maps to the provider's notification event type id, which is
/// what notification rules subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    /// A pipeline execution started.
    PipelineExecutionStarted,
    /// A pipeline execution succeeded.
    PipelineExecutionSucceeded,
    /// A pipeline execution failed.
    PipelineExecutionFailed,
    /// A pipeline execution was stopped or ended by a rejected approval.
    PipelineExecutionCanceled,
    /// A stage began.
    StageExecutionStarted,
    /// A stage succeeded.
    StageExecutionSucceeded,
    /// A stage failed.
    StageExecutionFailed,
    /// A manual approval is waiting for a decision.
    ManualApprovalNeeded,
    /// A manual approval was approved.
    ManualApprovalSucceeded,
    /// A manual approval was rejected.
    ManualApprovalFailed,
    /// A build started.
    BuildStateInProgress,
    /// A build succeeded.
    BuildStateSucceeded,
    /// A build failed.
    BuildStateFailed,
}

impl LifecycleEventKind {
    /// Returns the provider's notification event type id.
    #[must_use]
    pub fn event_type_id(&self) -> &'static str {
        match self {
            Self::PipelineExecutionStarted => "codepipeline-pipeline-pipeline-execution-started",
            Self::PipelineExecutionSucceeded => "codepipeline-pipeline-pipeline-execution-succeeded",
            Self::PipelineExecutionFailed => "codepipeline-pipeline-pipeline-execution-failed",
            Self::PipelineExecutionCanceled => "codepipeline-pipeline-pipeline-execution-canceled",
            Self::StageExecutionStarted => "codepipeline-pipeline-stage-execution-started",
            Self::StageExecutionSucceeded => "codepipeline-pipeline-stage-execution-succeeded",
            Self::StageExecutionFailed => "codepipeline-pipeline-stage-execution-failed",
            Self::ManualApprovalNeeded => "codepipeline-pipeline-manual-approval-needed",
            Self::ManualApprovalSucceeded => "codepipeline-pipeline-manual-approval-succeeded",
            Self::ManualApprovalFailed => "codepipeline-pipeline-manual-approval-failed",
            Self::BuildStateInProgress => "codebuild-project-build-state-in-progress",
            Self::BuildStateSucceeded => "codebuild-project-build-state-succeeded",
            Self::BuildStateFailed => "codebuild-project-build-state-failed",
        }
    }

    /// Short label used in chat messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::PipelineExecutionStarted => "Pipeline started",
            Self::PipelineExecutionSucceeded => "Pipeline succeeded",
            Self::PipelineExecutionFailed => "Pipeline failed",
            Self::PipelineExecutionCanceled => "Pipeline canceled",
            Self::StageExecutionStarted => "Stage started",
            Self::StageExecutionSucceeded => "Stage succeeded",
            Self::StageExecutionFailed => "Stage failed",
            Self::ManualApprovalNeeded => "Manual approval needed",
            Self::ManualApprovalSucceeded => "Manual approval approved",
            Self::ManualApprovalFailed => "Manual approval rejected",
            Self::BuildStateInProgress => "Build in progress",
            Self::BuildStateSucceeded => "Build succeeded",
            Self::BuildStateFailed => "Build failed",
        }
    }
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type_id())
    }
}

/// The resource an event originates from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum EventResource {
    /// A pipeline, by name.
    Pipeline(String),
    /// A build project, by name.
    BuildProject(String),
}

impl fmt::Display for EventResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline(name) => write!(f, "pipeline/{name}"),
            Self::BuildProject(name) => write!(f, "project/{name}"),
        }
    }
}

/// A lifecycle event observed during an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// What happened.
    pub kind: LifecycleEventKind,
    /// Which resource it happened to.
    pub resource: EventResource,
    /// The pipeline the execution belongs to.
    pub pipeline_name: String,
    /// The execution id.
    pub execution_id: Uuid,
    /// The stage involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// The action involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Free-form detail (error message, terminal status).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the event occurred (ISO 8601).
    pub timestamp: String,
}

impl PipelineEvent {
    /// Creates a pipeline-scoped event.
    #[must_use]
    pub fn pipeline(kind: LifecycleEventKind, pipeline_name: impl Into<String>, execution_id: Uuid) -> Self {
        let pipeline_name = pipeline_name.into();
        Self {
            kind,
            resource: EventResource::Pipeline(pipeline_name.clone()),
            pipeline_name,
            execution_id,
            stage: None,
            action: None,
            detail: None,
            timestamp: crate::utils::iso_timestamp(),
        }
    }

    /// Creates a build-project-scoped event.
    #[must_use]
    pub fn build(
        kind: LifecycleEventKind,
        project_name: impl Into<String>,
        pipeline_name: impl Into<String>,
        execution_id: Uuid,
    ) -> Self {
        Self {
            kind,
            resource: EventResource::BuildProject(project_name.into()),
            pipeline_name: pipeline_name.into(),
            execution_id,
            stage: None,
            action: None,
            detail: None,
            timestamp: crate::utils::iso_timestamp(),
        }
    }

    /// Sets the stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Sets the action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Sets the detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Emitted when the approval gate enters `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    /// The pipeline name.
    pub pipeline_name: String,
    /// The execution waiting for approval.
    pub execution_id: Uuid,
    /// The approval stage.
    pub stage_name: String,
    /// The approval action.
    pub action_name: String,
    /// Id of this attempt of the approval action.
    pub action_execution_id: String,
    /// Token a reply must present to resolve the approval.
    pub token: Uuid,
    /// When the approval was requested (ISO 8601).
    pub requested_at: String,
}

/// Everything that travels on the notification bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    /// A lifecycle event.
    Lifecycle(PipelineEvent),
    /// The approval gate is waiting.
    ApprovalPending(ApprovalEvent),
}

impl BusEvent {
    /// Returns a short label for logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Lifecycle(event) => event.kind.event_type_id(),
            Self::ApprovalPending(_) => "approval.pending",
        }
    }

    /// Returns the pipeline name the event belongs to.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        match self {
            Self::Lifecycle(event) => &event.pipeline_name,
            Self::ApprovalPending(event) => &event.pipeline_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_ids() {
        assert_eq!(
            LifecycleEventKind::ManualApprovalNeeded.event_type_id(),
            "codepipeline-pipeline-manual-approval-needed"
        );
        assert_eq!(
            LifecycleEventKind::BuildStateFailed.to_string(),
            "codebuild-project-build-state-failed"
        );
    }

    #[test]
    fn test_pipeline_event_builders() {
        let id = Uuid::new_v4();
        let event = PipelineEvent::pipeline(LifecycleEventKind::StageExecutionFailed, "backend-dev", id)
            .with_stage("DeployEcs")
            .with_action("CodeDeploy")
            .with_detail("boom");

        assert_eq!(event.resource, EventResource::Pipeline("backend-dev".to_string()));
        assert_eq!(event.stage.as_deref(), Some("DeployEcs"));
        assert_eq!(event.detail.as_deref(), Some("boom"));
    }

    #[test]
    fn test_build_event_resource() {
        let event = PipelineEvent::build(
            LifecycleEventKind::BuildStateFailed,
            "docker-build-project-dev",
            "backend-dev",
            Uuid::new_v4(),
        );
        assert_eq!(event.resource.to_string(), "project/docker-build-project-dev");
        assert_eq!(event.pipeline_name, "backend-dev");
    }

    #[test]
    fn test_bus_event_serialization() {
        let event = BusEvent::Lifecycle(PipelineEvent::pipeline(
            LifecycleEventKind::PipelineExecutionStarted,
            "backend-dev",
            Uuid::nil(),
        ));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "lifecycle");
        assert_eq!(json["kind"], "pipeline_execution_started");
        assert_eq!(json["resource"]["type"], "pipeline");
        assert_eq!(event.pipeline_name(), "backend-dev");
    }
}
