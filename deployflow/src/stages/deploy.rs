//! Deploy stage actions: autoscaling hooks around the container cutover.

use super::{Action, ActionContext};
use crate::core::{ActionCategory, ActionOutput};
use crate::ports::{AutoscalingControl, DeployInvoker, DeployRequest, EcsTarget};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Which side of the deployment a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingHook {
    /// Before install: suspend scaling.
    Suspend,
    /// After install: resume scaling.
    Resume,
}

/// Suspends or resumes autoscaling of the target service.
pub struct ScalingHookAction {
    hook: ScalingHook,
    target: EcsTarget,
    control: Arc<dyn AutoscalingControl>,
}

impl ScalingHookAction {
    /// The `stopEcsAutoScaling` action.
    #[must_use]
    pub fn suspend(target: EcsTarget, control: Arc<dyn AutoscalingControl>) -> Self {
        Self {
            hook: ScalingHook::Suspend,
            target,
            control,
        }
    }

    /// The `restartEcsAutoScaling` action.
    #[must_use]
    pub fn resume(target: EcsTarget, control: Arc<dyn AutoscalingControl>) -> Self {
        Self {
            hook: ScalingHook::Resume,
            target,
            control,
        }
    }

    /// Returns the hook side.
    #[must_use]
    pub fn hook(&self) -> ScalingHook {
        self.hook
    }
}

impl std::fmt::Debug for ScalingHookAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalingHookAction")
            .field("hook", &self.hook)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for ScalingHookAction {
    fn name(&self) -> &str {
        match self.hook {
            ScalingHook::Suspend => "stopEcsAutoScaling",
            ScalingHook::Resume => "restartEcsAutoScaling",
        }
    }

    fn category(&self) -> ActionCategory {
        ActionCategory::Invoke
    }

    async fn execute(&self, _ctx: &ActionContext) -> ActionOutput {
        let result = match self.hook {
            ScalingHook::Suspend => self.control.suspend(&self.target).await,
            ScalingHook::Resume => self.control.resume(&self.target).await,
        };

        match result {
            Ok(()) => {
                info!(target = %self.target, hook = ?self.hook, "Autoscaling updated");
                ActionOutput::succeeded()
            }
            Err(e) => ActionOutput::failed(e.to_string()),
        }
    }
}

/// The all-at-once container deployment.
pub struct EcsDeployAction {
    request: DeployRequest,
    invoker: Arc<dyn DeployInvoker>,
}

impl EcsDeployAction {
    /// Creates the action.
    #[must_use]
    pub fn new(request: DeployRequest, invoker: Arc<dyn DeployInvoker>) -> Self {
        Self { request, invoker }
    }

    /// Returns the deployment request.
    #[must_use]
    pub fn request(&self) -> &DeployRequest {
        &self.request
    }
}

impl std::fmt::Debug for EcsDeployAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcsDeployAction")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for EcsDeployAction {
    fn name(&self) -> &str {
        "CodeDeploy"
    }

    fn category(&self) -> ActionCategory {
        ActionCategory::Deploy
    }

    fn input_artifacts(&self) -> Vec<String> {
        vec![
            self.request.task_definition.artifact.clone(),
            self.request.app_spec.artifact.clone(),
        ]
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        for input in self.input_artifacts() {
            if ctx.artifact(&input).is_none() {
                return ActionOutput::failed(format!("Input artifact '{input}' is missing"));
            }
        }

        match self.invoker.deploy(&self.request).await {
            Ok(report) => {
                info!(
                    application = %self.request.application,
                    deployment_group = %self.request.deployment_group,
                    deployment_id = %report.deployment_id,
                    "Deployment succeeded"
                );
                ActionOutput::succeeded().with_summary(format!("Deployment {}", report.deployment_id))
            }
            Err(e) => {
                // Nothing resumes scaling once the cutover fails.
                warn!(
                    target = %self.request.target,
                    error = %e,
                    "Deployment failed; autoscaling stays suspended until restored manually"
                );
                ActionOutput::failed(e.to_string())
            }
        }
    }
}
