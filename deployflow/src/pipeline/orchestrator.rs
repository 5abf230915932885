//! In-memory execution registry.
//!
//! Plays the orchestration service for in-process runs: the runner
//! registers executions and records action attempts here, the pre-flight
//! action lists and stops executions through the
//! [`OrchestrationService`] port, and the approval notifier reads
//! pipeline state back from it.

use crate::cancellation::CancellationToken;
use crate::core::{ActionStatus, ExecutionStatus};
use crate::errors::ServiceError;
use crate::ports::{ActionExecution, ActionState, ExecutionSummary, OrchestrationService, PipelineState, StageState};
use crate::utils::{now_utc, Timestamp};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const SERVICE: &str = "orchestration";

/// Stage and action names of a pipeline, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLayout {
    /// The stage name.
    pub stage_name: String,
    /// Action names in declaration order.
    pub action_names: Vec<String>,
}

struct ExecutionEntry {
    pipeline_name: String,
    status: ExecutionStatus,
    started_at: Timestamp,
    cancel: Arc<CancellationToken>,
}

impl ExecutionEntry {
    fn is_live(&self) -> bool {
        self.status == ExecutionStatus::InProgress && !self.cancel.is_cancelled()
    }

    fn summary(&self, execution_id: Uuid) -> ExecutionSummary {
        ExecutionSummary {
            execution_id,
            status: self.status,
            started_at: self.started_at,
        }
    }
}

/// Executions and pipeline state held in memory.
#[derive(Default)]
pub struct InMemoryOrchestrator {
    executions: DashMap<Uuid, ExecutionEntry>,
    states: DashMap<String, PipelineState>,
}

impl InMemoryOrchestrator {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new in-progress execution.
    ///
    /// The first registration with a non-empty layout fixes the shape of
    /// the pipeline state; later executions keep updating the same state.
    pub fn register(
        &self,
        pipeline_name: &str,
        execution_id: Uuid,
        layout: &[StageLayout],
        cancel: Arc<CancellationToken>,
    ) {
        self.executions.insert(
            execution_id,
            ExecutionEntry {
                pipeline_name: pipeline_name.to_string(),
                status: ExecutionStatus::InProgress,
                started_at: now_utc(),
                cancel,
            },
        );

        let mut state = self
            .states
            .entry(pipeline_name.to_string())
            .or_insert_with(|| PipelineState {
                pipeline_name: pipeline_name.to_string(),
                stage_states: Vec::new(),
            });
        if state.stage_states.is_empty() {
            state.stage_states = layout
                .iter()
                .map(|stage| StageState {
                    stage_name: stage.stage_name.clone(),
                    action_states: stage
                        .action_names
                        .iter()
                        .map(|name| ActionState {
                            action_name: name.clone(),
                            latest_execution: None,
                        })
                        .collect(),
                })
                .collect();
        }

        debug!(pipeline = %pipeline_name, execution_id = %execution_id, "Execution registered");
    }

    fn with_action<F>(&self, pipeline_name: &str, stage: &str, action: &str, f: F)
    where
        F: FnOnce(&mut ActionState),
    {
        let Some(mut state) = self.states.get_mut(pipeline_name) else {
            return;
        };
        let stage_index = match state.stage_states.iter().position(|s| s.stage_name == stage) {
            Some(index) => index,
            None => {
                state.stage_states.push(StageState {
                    stage_name: stage.to_string(),
                    action_states: Vec::new(),
                });
                state.stage_states.len() - 1
            }
        };
        let actions = &mut state.stage_states[stage_index].action_states;
        let action_index = match actions.iter().position(|a| a.action_name == action) {
            Some(index) => index,
            None => {
                actions.push(ActionState {
                    action_name: action.to_string(),
                    latest_execution: None,
                });
                actions.len() - 1
            }
        };
        f(&mut actions[action_index]);
    }

    /// Records a fresh attempt of an action as the latest one.
    pub fn record_action_started(&self, pipeline_name: &str, stage: &str, action: &str, action_execution_id: &str) {
        self.with_action(pipeline_name, stage, action, |state| {
            state.latest_execution = Some(ActionExecution {
                action_execution_id: action_execution_id.to_string(),
                status: ActionStatus::InProgress,
                summary: None,
                last_status_change: now_utc(),
                token: None,
            });
        });
    }

    /// Records the outcome of an attempt, if it is still the latest one.
    pub fn record_action_finished(
        &self,
        pipeline_name: &str,
        stage: &str,
        action: &str,
        action_execution_id: &str,
        status: ActionStatus,
        summary: Option<String>,
    ) {
        self.with_action(pipeline_name, stage, action, |state| {
            if let Some(latest) = state
                .latest_execution
                .as_mut()
                .filter(|latest| latest.action_execution_id == action_execution_id)
            {
                latest.status = status;
                latest.summary = summary;
                latest.last_status_change = now_utc();
            }
        });
    }

    /// Attaches the approval token to the latest attempt of an approval action.
    pub fn attach_token(
        &self,
        pipeline_name: &str,
        stage: &str,
        action: &str,
        action_execution_id: &str,
        token: Uuid,
    ) {
        self.with_action(pipeline_name, stage, action, |state| {
            if let Some(latest) = state
                .latest_execution
                .as_mut()
                .filter(|latest| latest.action_execution_id == action_execution_id)
            {
                latest.token = Some(token);
            }
        });
    }

    /// Marks an execution terminal. Terminal executions never change again.
    pub fn finish(&self, execution_id: Uuid, status: ExecutionStatus) {
        if let Some(mut entry) = self.executions.get_mut(&execution_id) {
            if !entry.status.is_terminal() {
                entry.status = status;
            }
        }
    }

    /// Returns one execution.
    #[must_use]
    pub fn execution(&self, execution_id: Uuid) -> Option<ExecutionSummary> {
        self.executions
            .get(&execution_id)
            .map(|entry| entry.summary(execution_id))
    }

    /// Returns the cancellation token of an execution.
    #[must_use]
    pub fn cancel_token(&self, execution_id: Uuid) -> Option<Arc<CancellationToken>> {
        self.executions.get(&execution_id).map(|entry| entry.cancel.clone())
    }
}

impl std::fmt::Debug for InMemoryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryOrchestrator")
            .field("executions", &self.executions.len())
            .field("pipelines", &self.states.len())
            .finish()
    }
}

#[async_trait]
impl OrchestrationService for InMemoryOrchestrator {
    async fn list_in_progress(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>, ServiceError> {
        let mut live: Vec<ExecutionSummary> = self
            .executions
            .iter()
            .filter(|entry| entry.pipeline_name == pipeline_name && entry.is_live())
            .map(|entry| entry.summary(*entry.key()))
            .collect();
        live.sort_by_key(|summary| summary.started_at);
        Ok(live)
    }

    async fn stop_execution(
        &self,
        pipeline_name: &str,
        execution_id: Uuid,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let cancel = {
            let entry = self
                .executions
                .get(&execution_id)
                .filter(|entry| entry.pipeline_name == pipeline_name)
                .ok_or_else(|| ServiceError::not_found(SERVICE, format!("{pipeline_name}/{execution_id}")))?;
            if entry.status.is_terminal() {
                return Ok(());
            }
            entry.cancel.clone()
        };

        info!(pipeline = %pipeline_name, execution_id = %execution_id, reason, "Stop requested");
        cancel.cancel(reason);
        Ok(())
    }

    async fn pipeline_state(&self, pipeline_name: &str) -> Result<PipelineState, ServiceError> {
        self.states
            .get(pipeline_name)
            .map(|state| state.clone())
            .ok_or_else(|| ServiceError::not_found(SERVICE, pipeline_name))
    }
}
