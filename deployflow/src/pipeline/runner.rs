//! Pipeline execution engine.
//!
//! Stages run strictly in order. Inside a stage, actions are grouped by
//! run order: a group runs concurrently, groups run in ascending order,
//! and the first group with a non-successful action ends the stage. The
//! worst status in that group becomes the stage status, and a stage that
//! did not succeed ends the execution.

use super::{
    ActionResult, ActionSpec, ExecutionTrigger, InMemoryOrchestrator, PipelineDefinition, PipelineExecution,
    StageResult, StageSpec,
};
use crate::cancellation::CancellationToken;
use crate::core::{ActionOutput, ActionStatus, BusEvent, ExecutionStatus, LifecycleEventKind, PipelineEvent};
use crate::errors::DeployflowError;
use crate::events::NotificationBus;
use crate::observability::SpanTimer;
use crate::stages::{ActionContext, ExecutionScope};
use crate::utils::{now_utc, Timestamp};
use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

struct PreparedRun {
    trigger: ExecutionTrigger,
    cancel: Arc<CancellationToken>,
    prepared_at: Timestamp,
}

struct RunnerInner {
    definition: PipelineDefinition,
    registry: Arc<InMemoryOrchestrator>,
    bus: NotificationBus,
    prepared: DashMap<Uuid, PreparedRun>,
}

/// Runs executions of one pipeline definition. Cloning shares the runner.
#[derive(Clone)]
pub struct PipelineRunner {
    inner: Arc<RunnerInner>,
}

/// A started execution.
#[derive(Debug)]
pub struct ExecutionHandle {
    /// The execution id.
    pub execution_id: Uuid,
    join: JoinHandle<Result<PipelineExecution, DeployflowError>>,
}

impl ExecutionHandle {
    /// Waits for the execution to reach a terminal status.
    pub async fn wait(self) -> Result<PipelineExecution, DeployflowError> {
        self.join
            .await
            .map_err(|e| DeployflowError::Internal(format!("execution task failed: {e}")))?
    }
}

impl PipelineRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(definition: PipelineDefinition, registry: Arc<InMemoryOrchestrator>, bus: NotificationBus) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                definition,
                registry,
                bus,
                prepared: DashMap::new(),
            }),
        }
    }

    /// Returns the pipeline definition.
    #[must_use]
    pub fn definition(&self) -> &PipelineDefinition {
        &self.inner.definition
    }

    /// Returns the execution registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<InMemoryOrchestrator> {
        &self.inner.registry
    }

    /// Returns the notification bus.
    #[must_use]
    pub fn bus(&self) -> &NotificationBus {
        &self.inner.bus
    }

    /// Allocates an execution id and registers the execution as in
    /// progress, without running anything yet.
    pub fn prepare(&self, trigger: ExecutionTrigger) -> Uuid {
        let execution_id = Uuid::now_v7();
        let cancel = Arc::new(CancellationToken::new());
        let definition = &self.inner.definition;

        self.inner
            .registry
            .register(definition.name(), execution_id, &definition.layout(), cancel.clone());
        self.inner.prepared.insert(
            execution_id,
            PreparedRun {
                trigger,
                cancel,
                prepared_at: now_utc(),
            },
        );
        execution_id
    }

    /// Prepares an execution and runs it on a spawned task.
    pub fn start(&self, trigger: ExecutionTrigger) -> ExecutionHandle {
        let execution_id = self.prepare(trigger);
        let runner = self.clone();
        let join = tokio::spawn(async move { runner.run(execution_id).await });
        ExecutionHandle { execution_id, join }
    }

    /// Runs a prepared execution to its terminal status.
    ///
    /// # Errors
    ///
    /// Fails only if `execution_id` was never prepared or already ran.
    /// Stage failures are reported in the returned execution.
    pub async fn run(&self, execution_id: Uuid) -> Result<PipelineExecution, DeployflowError> {
        let (_, prepared) = self.inner.prepared.remove(&execution_id).ok_or_else(|| {
            DeployflowError::Internal(format!("execution {execution_id} was not prepared or already ran"))
        })?;

        let span = info_span!(
            "pipeline_execution",
            pipeline = %self.inner.definition.name(),
            execution_id = %execution_id,
        );
        Ok(self.execute(execution_id, prepared).instrument(span).await)
    }

    fn publish(&self, event: PipelineEvent) {
        self.inner.bus.publish(BusEvent::Lifecycle(event));
    }

    fn pipeline_event(&self, kind: LifecycleEventKind, execution_id: Uuid) -> PipelineEvent {
        PipelineEvent::pipeline(kind, self.inner.definition.name(), execution_id)
    }

    async fn execute(&self, execution_id: Uuid, prepared: PreparedRun) -> PipelineExecution {
        let definition = &self.inner.definition;
        let scope = Arc::new(ExecutionScope::new(
            definition.name(),
            execution_id,
            self.inner.bus.clone(),
            prepared.cancel.clone(),
            self.inner.registry.clone(),
        ));

        info!(trigger = %prepared.trigger, "Execution started");
        self.publish(self.pipeline_event(LifecycleEventKind::PipelineExecutionStarted, execution_id));

        let mut stages = Vec::new();
        let mut status = ExecutionStatus::Succeeded;
        let mut failure = None;

        for stage in definition.stages() {
            if scope.cancel_token().is_cancelled() {
                status = ExecutionStatus::Stopped;
                break;
            }

            self.publish(
                self.pipeline_event(LifecycleEventKind::StageExecutionStarted, execution_id)
                    .with_stage(&stage.name),
            );
            let result = self.run_stage(&scope, stage).await;

            match result.status {
                ActionStatus::Succeeded => {
                    self.publish(
                        self.pipeline_event(LifecycleEventKind::StageExecutionSucceeded, execution_id)
                            .with_stage(&stage.name),
                    );
                }
                ActionStatus::Failed | ActionStatus::InProgress => {
                    let reason = result.first_error().unwrap_or("action failed").to_string();
                    warn!(stage = %stage.name, error = %reason, "Stage failed");
                    self.publish(
                        self.pipeline_event(LifecycleEventKind::StageExecutionFailed, execution_id)
                            .with_stage(&stage.name)
                            .with_detail(&reason),
                    );
                    failure = Some(DeployflowError::StageFailed {
                        stage: stage.name.clone(),
                        reason,
                    });
                }
                ActionStatus::Rejected | ActionStatus::Stopped => {}
            }

            let stage_status = result.status;
            stages.push(result);
            if !stage_status.is_success() {
                status = match stage_status {
                    ActionStatus::InProgress => ExecutionStatus::Failed,
                    other => other.into(),
                };
                break;
            }
        }

        self.inner.registry.finish(execution_id, status);

        let terminal = match status {
            ExecutionStatus::Succeeded | ExecutionStatus::InProgress => {
                self.pipeline_event(LifecycleEventKind::PipelineExecutionSucceeded, execution_id)
            }
            ExecutionStatus::Failed => {
                let detail = failure.map_or_else(|| "failed".to_string(), |e| e.to_string());
                self.pipeline_event(LifecycleEventKind::PipelineExecutionFailed, execution_id).with_detail(detail)
            }
            ExecutionStatus::Stopped => {
                let reason = scope
                    .cancel_token()
                    .reason()
                    .unwrap_or_else(|| "execution stopped".to_string());
                self.pipeline_event(LifecycleEventKind::PipelineExecutionCanceled, execution_id)
                    .with_detail(format!("stopped: {reason}"))
            }
            ExecutionStatus::Rejected => {
                self.pipeline_event(LifecycleEventKind::PipelineExecutionCanceled, execution_id).with_detail("rejected")
            }
        };
        self.publish(terminal);
        info!(status = %status, stages = stages.len(), "Execution finished");

        PipelineExecution {
            pipeline_name: definition.name().to_string(),
            execution_id,
            status,
            trigger: prepared.trigger,
            stages,
            started_at: prepared.prepared_at,
            finished_at: now_utc(),
        }
    }

    async fn run_stage(&self, scope: &Arc<ExecutionScope>, stage: &StageSpec) -> StageResult {
        let timer = SpanTimer::start(&stage.name);
        let mut actions = Vec::new();
        let mut status = ActionStatus::Succeeded;

        for (run_order, group) in stage.run_order_groups() {
            if scope.cancel_token().is_cancelled() {
                status = ActionStatus::Stopped;
                break;
            }

            let results = join_all(group.into_iter().map(|spec| self.run_action(scope, &stage.name, spec))).await;
            let worst = results
                .iter()
                .map(|result| result.output.status)
                .max_by_key(|status| status.severity())
                .unwrap_or(ActionStatus::Succeeded);
            actions.extend(results);

            if !worst.is_success() {
                info!(stage = %stage.name, run_order, status = %worst, "Run-order group ended the stage");
                status = worst;
                break;
            }
        }

        let duration_ms = timer.finish();
        info!(stage = %stage.name, status = %status, duration_ms, "Stage finished");
        StageResult {
            stage_name: stage.name.clone(),
            status,
            actions,
            duration_ms,
        }
    }

    async fn run_action(&self, scope: &Arc<ExecutionScope>, stage_name: &str, spec: &ActionSpec) -> ActionResult {
        let ctx = ActionContext::new(scope.clone(), stage_name, spec.name());
        let registry = &self.inner.registry;
        let pipeline = scope.pipeline_name();

        registry.record_action_started(pipeline, stage_name, spec.name(), ctx.action_execution_id());
        let timer = SpanTimer::start(spec.name());

        let output = AssertUnwindSafe(spec.action.execute(&ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                warn!(stage = %stage_name, action = %spec.name(), "Action panicked");
                ActionOutput::failed(format!("Action '{}' panicked", spec.name()))
            });

        for artifact in &output.artifacts {
            scope.put_artifact(artifact.clone());
        }
        registry.record_action_finished(
            pipeline,
            stage_name,
            spec.name(),
            ctx.action_execution_id(),
            output.status,
            output.summary.clone(),
        );

        ActionResult {
            action_name: spec.name().to_string(),
            run_order: spec.run_order,
            action_execution_id: ctx.action_execution_id().to_string(),
            output,
            duration_ms: timer.finish(),
        }
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("pipeline", &self.inner.definition.name())
            .field("prepared", &self.inner.prepared.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionCategory;
    use crate::events::CollectingEventSink;
    use crate::pipeline::PipelineBuilder;
    use crate::ports::OrchestrationService;
    use crate::testing::{Journal, StaticAction};
    use std::time::Duration;

    fn manual() -> ExecutionTrigger {
        ExecutionTrigger::Manual {
            actor: "test".to_string(),
        }
    }

    fn runner_for(stages: Vec<StageSpec>) -> (PipelineRunner, Arc<CollectingEventSink>) {
        let builder = stages
            .into_iter()
            .fold(PipelineBuilder::new("backend-dev"), PipelineBuilder::stage);
        let definition = builder.build().unwrap();
        let bus = NotificationBus::new();
        let sink = Arc::new(CollectingEventSink::new());
        bus.subscribe(sink.clone());
        (PipelineRunner::new(definition, Arc::new(InMemoryOrchestrator::new()), bus), sink)
    }

    fn source(journal: &Journal) -> StageSpec {
        StageSpec::new("Source").with_action(
            Arc::new(
                StaticAction::succeeding("fetch")
                    .with_category(ActionCategory::Source)
                    .producing("src")
                    .recording(journal),
            ),
            1,
        )
    }

    #[tokio::test]
    async fn test_successful_execution() {
        let journal = Journal::new();
        let (runner, sink) = runner_for(vec![
            source(&journal),
            StageSpec::new("Build").with_action(
                Arc::new(StaticAction::succeeding("build").reading("src").recording(&journal)),
                1,
            ),
        ]);

        let execution = runner.start(manual()).wait().await.unwrap();
        runner.bus().drain().await;

        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        assert_eq!(execution.stage_names(), vec!["Source", "Build"]);
        assert_eq!(journal.calls(), vec!["fetch".to_string(), "build".to_string()]);
        assert_eq!(
            sink.lifecycle_kinds(),
            vec![
                LifecycleEventKind::PipelineExecutionStarted,
                LifecycleEventKind::StageExecutionStarted,
                LifecycleEventKind::StageExecutionSucceeded,
                LifecycleEventKind::StageExecutionStarted,
                LifecycleEventKind::StageExecutionSucceeded,
                LifecycleEventKind::PipelineExecutionSucceeded,
            ]
        );
        assert_eq!(
            runner.registry().execution(execution.execution_id).unwrap().status,
            ExecutionStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_run_orders_are_sequential_and_groups_concurrent() {
        let journal = Journal::new();
        let slow = StaticAction::succeeding("slow")
            .with_delay(Duration::from_millis(30))
            .recording(&journal);
        let fast = StaticAction::succeeding("fast").recording(&journal);
        let last = StaticAction::succeeding("last").recording(&journal);
        let (runner, _) = runner_for(vec![
            source(&journal),
            StageSpec::new("Work")
                .with_action(Arc::new(last), 2)
                .with_action(Arc::new(slow), 1)
                .with_action(Arc::new(fast), 1),
        ]);

        let execution = runner.start(manual()).wait().await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        // fast finishes inside slow's delay; last waits for both.
        assert_eq!(
            journal.calls(),
            vec!["fetch".to_string(), "fast".to_string(), "slow".to_string(), "last".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_group_ends_stage_and_execution() {
        let journal = Journal::new();
        let (runner, sink) = runner_for(vec![
            source(&journal),
            StageSpec::new("Work")
                .with_action(Arc::new(StaticAction::failing("broken", "exit 1").recording(&journal)), 1)
                .with_action(Arc::new(StaticAction::succeeding("after").recording(&journal)), 2),
            StageSpec::new("Never").with_action(Arc::new(StaticAction::succeeding("never").recording(&journal)), 1),
        ]);

        let execution = runner.start(manual()).wait().await.unwrap();
        runner.bus().drain().await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.stage_names(), vec!["Source", "Work"]);
        assert!(!journal.calls().contains(&"after".to_string()));
        assert!(!journal.calls().contains(&"never".to_string()));

        let terminal = sink.lifecycle().pop().unwrap();
        assert_eq!(terminal.kind, LifecycleEventKind::PipelineExecutionFailed);
        assert_eq!(terminal.detail.as_deref(), Some("Stage 'Work' failed: exit 1"));
    }

    #[tokio::test]
    async fn test_rejection_is_canceled_not_failed() {
        let journal = Journal::new();
        let (runner, sink) = runner_for(vec![
            source(&journal),
            StageSpec::new("Gate").with_action(
                Arc::new(StaticAction::with_output("gate", ActionOutput::rejected("Rejected"))),
                1,
            ),
            StageSpec::new("Never").with_action(Arc::new(StaticAction::succeeding("never").recording(&journal)), 1),
        ]);

        let execution = runner.start(manual()).wait().await.unwrap();
        runner.bus().drain().await;

        assert_eq!(execution.status, ExecutionStatus::Rejected);
        let kinds = sink.lifecycle_kinds();
        assert!(!kinds.contains(&LifecycleEventKind::PipelineExecutionFailed));
        assert!(!kinds.contains(&LifecycleEventKind::StageExecutionFailed));
        let terminal = sink.lifecycle().pop().unwrap();
        assert_eq!(terminal.kind, LifecycleEventKind::PipelineExecutionCanceled);
        assert_eq!(terminal.detail.as_deref(), Some("rejected"));
    }

    #[tokio::test]
    async fn test_panicking_action_fails_stage() {
        let journal = Journal::new();
        let (runner, _) = runner_for(vec![
            source(&journal),
            StageSpec::new("Work").with_action(Arc::new(StaticAction::panicking("boom")), 1),
        ]);

        let execution = runner.start(manual()).wait().await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(
            execution.stage("Work").unwrap().first_error(),
            Some("Action 'boom' panicked")
        );
    }

    #[tokio::test]
    async fn test_stop_before_run() {
        let journal = Journal::new();
        let (runner, sink) = runner_for(vec![source(&journal)]);
        let id = runner.prepare(manual());
        runner.registry().cancel_token(id).unwrap().cancel("Superseded");

        let execution = runner.run(id).await.unwrap();
        runner.bus().drain().await;

        assert_eq!(execution.status, ExecutionStatus::Stopped);
        assert!(execution.stages.is_empty());
        assert!(journal.calls().is_empty());
        assert_eq!(
            sink.lifecycle().pop().unwrap().detail.as_deref(),
            Some("stopped: Superseded")
        );
    }

    #[tokio::test]
    async fn test_run_unknown_execution() {
        let (runner, _) = runner_for(vec![source(&Journal::new())]);
        let id = runner.prepare(manual());
        runner.run(id).await.unwrap();

        assert!(matches!(runner.run(id).await, Err(DeployflowError::Internal(_))));
        assert!(runner.run(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_artifacts_and_state_recorded() {
        let journal = Journal::new();
        let (runner, _) = runner_for(vec![source(&journal)]);

        let execution = runner.start(manual()).wait().await.unwrap();

        assert_eq!(execution.artifacts()[0].name, "src");
        let state = runner
            .registry()
            .pipeline_state("backend-dev")
            .await
            .unwrap();
        let latest = state.latest_execution("Source", "fetch").unwrap();
        assert_eq!(latest.status, ActionStatus::Succeeded);
        assert_eq!(
            latest.action_execution_id,
            execution.stage("Source").unwrap().actions[0].action_execution_id
        );
    }
}
