//! Pre-flight: stop executions that are still running for the same pipeline.

use super::{Action, ActionContext};
use crate::core::{ActionCategory, ActionOutput};
use crate::errors::ServiceError;
use crate::ports::OrchestrationService;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stops every in-progress execution of `pipeline_name` that started
/// before `current`.
///
/// Executions are ordered by start time, then by id. Newer executions are
/// left alone: their own pre-flight stops `current`. If `current` is no
/// longer in progress nothing is stopped. Returns the ids that were asked
/// to stop. The first list or stop error aborts the sweep; nothing is
/// retried.
pub async fn stop_previous_executions(
    orchestration: &dyn OrchestrationService,
    pipeline_name: &str,
    current: Uuid,
) -> Result<Vec<Uuid>, ServiceError> {
    let in_progress = orchestration.list_in_progress(pipeline_name).await?;
    let Some(own) = in_progress.iter().find(|e| e.execution_id == current) else {
        debug!(pipeline = %pipeline_name, current_execution = %current, "Current execution is no longer in progress");
        return Ok(Vec::new());
    };
    let own_key = (own.started_at, own.execution_id);
    let reason = format!("Superseded by execution {current}");

    let mut stopped = Vec::new();
    for execution in in_progress
        .iter()
        .filter(|e| (e.started_at, e.execution_id) < own_key)
    {
        orchestration
            .stop_execution(pipeline_name, execution.execution_id, &reason)
            .await?;
        info!(
            pipeline = %pipeline_name,
            stopped_execution = %execution.execution_id,
            current_execution = %current,
            "Stopped previous execution"
        );
        stopped.push(execution.execution_id);
    }

    Ok(stopped)
}

/// The `stopPreviousExecution` action.
pub struct StopPreviousExecution {
    orchestration: Arc<dyn OrchestrationService>,
}

impl StopPreviousExecution {
    /// Creates the action.
    #[must_use]
    pub fn new(orchestration: Arc<dyn OrchestrationService>) -> Self {
        Self { orchestration }
    }
}

impl std::fmt::Debug for StopPreviousExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopPreviousExecution").finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for StopPreviousExecution {
    fn name(&self) -> &str {
        "stopPreviousExecution"
    }

    fn category(&self) -> ActionCategory {
        ActionCategory::Invoke
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        match stop_previous_executions(self.orchestration.as_ref(), ctx.pipeline_name(), ctx.execution_id()).await {
            Ok(stopped) => {
                let ids: Vec<String> = stopped.iter().map(ToString::to_string).collect();
                ActionOutput::succeeded()
                    .with_summary(format!("Stopped {} previous execution(s)", stopped.len()))
                    .add_metadata("stopped_executions", serde_json::json!(ids))
            }
            Err(e) => {
                warn!(pipeline = %ctx.pipeline_name(), error = %e, "Could not stop previous executions");
                ActionOutput::failed(e.to_string())
            }
        }
    }
}
