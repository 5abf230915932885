//! Orchestration service port: executions and pipeline state.

use crate::core::{ActionStatus, ExecutionStatus};
use crate::errors::ServiceError;
use crate::utils::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One execution as listed by the orchestration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// The execution id.
    pub execution_id: Uuid,
    /// Current status.
    pub status: ExecutionStatus,
    /// When the execution started.
    pub started_at: Timestamp,
}

/// The latest attempt of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionExecution {
    /// Id of this attempt.
    pub action_execution_id: String,
    /// Status of this attempt.
    pub status: ActionStatus,
    /// Provider summary; for a source action, the commit message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// When the status last changed.
    pub last_status_change: Timestamp,
    /// Approval token, for a manual approval action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Uuid>,
}

/// State of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    /// The action name.
    pub action_name: String,
    /// The latest attempt, if the action ever ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_execution: Option<ActionExecution>,
}

/// State of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageState {
    /// The stage name.
    pub stage_name: String,
    /// Actions in declaration order.
    pub action_states: Vec<ActionState>,
}

/// Latest state of every stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    /// The pipeline name.
    pub pipeline_name: String,
    /// Stages in declaration order.
    pub stage_states: Vec<StageState>,
}

impl PipelineState {
    /// Looks up the latest attempt of an action.
    #[must_use]
    pub fn latest_execution(&self, stage: &str, action: &str) -> Option<&ActionExecution> {
        self.stage_states
            .iter()
            .find(|s| s.stage_name == stage)?
            .action_states
            .iter()
            .find(|a| a.action_name == action)?
            .latest_execution
            .as_ref()
    }
}

/// The managed service that owns pipeline executions.
#[async_trait]
pub trait OrchestrationService: Send + Sync {
    /// Lists executions of `pipeline_name` that are still in progress.
    async fn list_in_progress(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>, ServiceError>;

    /// Requests that an execution stop.
    async fn stop_execution(
        &self,
        pipeline_name: &str,
        execution_id: Uuid,
        reason: &str,
    ) -> Result<(), ServiceError>;

    /// Returns the latest state of every stage.
    async fn pipeline_state(&self, pipeline_name: &str) -> Result<PipelineState, ServiceError>;
}
