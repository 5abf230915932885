//! Assembly of the backend deployment pipeline.
//!
//! `Source → StopPreviousExecution → BuildAndDeployApproval →
//! BuildAndDeploy → DeployEcs`, with the approval and lifecycle notifiers
//! subscribed to the bus and the trigger rule in front.

use super::{InMemoryOrchestrator, PipelineBuilder, PipelineDefinition, PipelineRunner, StageSpec};
use crate::approval::{ApprovalResponder, ApprovalService, ApprovalState};
use crate::config::{PipelineConfig, RunnerSettings};
use crate::core::ArtifactPath;
use crate::errors::{ApprovalError, DeployflowError, PipelineValidationError};
use crate::events::{LoggingEventSink, NotificationBus};
use crate::notify::{ApprovalNotifier, LifecycleNotifier, NotificationRule};
use crate::pipeline::ExecutionHandle;
use crate::ports::{DeployRequest, DeploymentConfig, EcsTarget, GitCheckout, Ports};
use crate::secrets::{Credentials, SecretResolver};
use crate::stages::{
    BuildAction, EcsDeployAction, GitSourceAction, ManualApprovalAction, ObjectSourceAction, ScalingHookAction,
    StopPreviousExecution,
};
use crate::trigger::{InboundEvent, TriggerRule};
use std::sync::Arc;
use tracing::info;

/// Source stage: git checkout and task definition bundle.
pub const SOURCE_STAGE: &str = "Source";
/// Pre-flight stage.
pub const PREFLIGHT_STAGE: &str = "StopPreviousExecution";
/// Manual approval stage.
pub const APPROVAL_STAGE: &str = "BuildAndDeployApproval";
/// Build stage.
pub const BUILD_STAGE: &str = "BuildAndDeploy";
/// Deploy stage.
pub const DEPLOY_STAGE: &str = "DeployEcs";

fn github_artifact(account_id: &str) -> String {
    format!("github-artifact-{account_id}")
}

fn s3_artifact(account_id: &str) -> String {
    format!("s3-artifact-{account_id}")
}

fn codebuild_artifact(account_id: &str) -> String {
    format!("codebuild-artifact-{account_id}")
}

/// Builds the five-stage definition for `config`.
pub fn backend_definition(
    config: &PipelineConfig,
    settings: &RunnerSettings,
    ports: &Ports,
    credentials: &Credentials,
    approvals: Arc<ApprovalService>,
) -> Result<PipelineDefinition, PipelineValidationError> {
    let params = config.params();
    let account = settings.account_id.as_str();
    let target = EcsTarget {
        cluster: params.ecs.ecs_cluster_name.clone(),
        service: params.ecs.ecs_service_name.clone(),
    };

    let source = StageSpec::new(SOURCE_STAGE)
        .with_action(
            Arc::new(GitSourceAction::new(
                GitCheckout {
                    owner: params.source.git.owner.clone(),
                    repository: params.source.git.repository_name.clone(),
                    branch: params.source.git.branch.clone(),
                },
                credentials.git_token.clone(),
                github_artifact(account),
                ports.git.clone(),
            )),
            1,
        )
        .with_action(
            Arc::new(ObjectSourceAction::new(
                &params.source.s3.bucket_name,
                &params.source.s3.bucket_key_backend_taskdef_file,
                s3_artifact(account),
                ports.objects.clone(),
            )),
            1,
        );

    let preflight = StageSpec::new(PREFLIGHT_STAGE)
        .with_action(Arc::new(StopPreviousExecution::new(ports.orchestration.clone())), 1);

    let approval = StageSpec::new(APPROVAL_STAGE)
        .with_action(Arc::new(ManualApprovalAction::new(approvals, settings.approval_timeout)), 1);

    let build = StageSpec::new(BUILD_STAGE).with_action(
        Arc::new(
            BuildAction::new(
                config.build_project_name(),
                &params.code_build.build_spec_file,
                github_artifact(account),
                codebuild_artifact(account),
                ports.build.clone(),
            )
            .with_env_var("AWS_ACCOUNT", account)
            .with_env_var("AWS_REGION", &settings.region)
            .with_env_var("BUILD_TARGET", params.build_target.as_str()),
        ),
        1,
    );

    let deploy_request = DeployRequest {
        application: config.deploy_application_name(),
        deployment_group: params.code_deploy.deployment_group_name.clone(),
        deployment_config: DeploymentConfig::AllAtOnce,
        task_definition: ArtifactPath::new(s3_artifact(account), &params.code_deploy.task_definition_template_file),
        app_spec: ArtifactPath::new(codebuild_artifact(account), &params.code_deploy.app_spec_template_file),
        target: target.clone(),
    };
    let deploy = StageSpec::new(DEPLOY_STAGE)
        .with_action(Arc::new(ScalingHookAction::suspend(target.clone(), ports.autoscaling.clone())), 1)
        .with_action(Arc::new(EcsDeployAction::new(deploy_request, ports.deploy.clone())), 2)
        .with_action(Arc::new(ScalingHookAction::resume(target, ports.autoscaling.clone())), 3);

    PipelineBuilder::new(config.pipeline_name())
        .stage(source)
        .stage(preflight)
        .stage(approval)
        .stage(build)
        .stage(deploy)
        .build()
}

/// The assembled backend pipeline and everything around it.
#[derive(Debug)]
pub struct BackendPipeline {
    runner: PipelineRunner,
    trigger: TriggerRule,
    approvals: Arc<ApprovalService>,
    responder: ApprovalResponder,
}

impl BackendPipeline {
    /// Resolves credentials, builds the pipeline and subscribes the
    /// notifiers.
    ///
    /// `registry` records executions and pipeline state; `ports.orchestration`
    /// is what the pre-flight stage and the approval notifier talk to, and
    /// is normally the same registry.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails with [`DeployflowError::Secret`] if either credential cannot
    /// be fetched; nothing is built or run in that case.
    pub async fn assemble(
        config: &PipelineConfig,
        settings: &RunnerSettings,
        ports: Ports,
        registry: Arc<InMemoryOrchestrator>,
    ) -> Result<Self, DeployflowError> {
        let credentials = SecretResolver::new(ports.secrets.as_ref())
            .resolve(&config.params().secret_manager)
            .await?;

        let approvals = Arc::new(ApprovalService::new());
        let definition = backend_definition(config, settings, &ports, &credentials, approvals.clone())?;

        let bus = NotificationBus::new();
        bus.subscribe(Arc::new(LoggingEventSink::default()));
        bus.subscribe(Arc::new(
            ApprovalNotifier::new(
                ports.orchestration.clone(),
                ports.chat.clone(),
                credentials.chat_token.clone(),
                &config.params().slack.channel_id,
                SOURCE_STAGE,
                "GitHubSource",
            )
            .with_utc_offset_hours(settings.notify_utc_offset_hours),
        ));
        bus.subscribe(Arc::new(LifecycleNotifier::new(
            vec![NotificationRule::pipeline_rule(config), NotificationRule::build_rule(config)],
            ports.chat.clone(),
            credentials.chat_token,
        )));

        info!(
            pipeline = %definition.name(),
            environment = %config.environment(),
            stages = definition.stages().len(),
            "Backend pipeline assembled"
        );

        Ok(Self {
            runner: PipelineRunner::new(definition, registry, bus),
            trigger: TriggerRule::for_config(config),
            responder: ApprovalResponder::new(approvals.clone()),
            approvals,
        })
    }

    /// Returns the runner.
    #[must_use]
    pub fn runner(&self) -> &PipelineRunner {
        &self.runner
    }

    /// Returns the pipeline definition.
    #[must_use]
    pub fn definition(&self) -> &PipelineDefinition {
        self.runner.definition()
    }

    /// Returns the trigger rule.
    #[must_use]
    pub fn trigger(&self) -> &TriggerRule {
        &self.trigger
    }

    /// Returns the approval service.
    #[must_use]
    pub fn approvals(&self) -> &Arc<ApprovalService> {
        &self.approvals
    }

    /// Returns the chat reply handler.
    #[must_use]
    pub fn responder(&self) -> &ApprovalResponder {
        &self.responder
    }

    /// Returns the notification bus.
    #[must_use]
    pub fn bus(&self) -> &NotificationBus {
        self.runner.bus()
    }

    /// Starts an execution if `event` matches the trigger rule.
    pub fn on_event(&self, event: &InboundEvent) -> Option<ExecutionHandle> {
        self.trigger.dispatch(event, &self.runner)
    }

    /// Applies an approval button press.
    pub fn on_reply(&self, action_id: &str, value: &str) -> Result<ApprovalState, ApprovalError> {
        self.responder.respond(action_id, value)
    }
}
