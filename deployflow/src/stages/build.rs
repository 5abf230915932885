//! The container build action.

use super::{Action, ActionContext};
use crate::core::{
    ActionCategory, ActionOutput, Artifact, ArtifactLocation, BusEvent, LifecycleEventKind, PipelineEvent,
};
use crate::ports::{BuildInvoker, BuildRequest};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the build project on the git source and publishes its output.
pub struct BuildAction {
    project_name: String,
    build_spec: String,
    environment_variables: BTreeMap<String, String>,
    input: String,
    output: String,
    invoker: Arc<dyn BuildInvoker>,
}

impl BuildAction {
    /// Creates the action.
    #[must_use]
    pub fn new(
        project_name: impl Into<String>,
        build_spec: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        invoker: Arc<dyn BuildInvoker>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            build_spec: build_spec.into(),
            environment_variables: BTreeMap::new(),
            input: input.into(),
            output: output.into(),
            invoker,
        }
    }

    /// Adds a plaintext environment variable.
    #[must_use]
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_variables.insert(key.into(), value.into());
        self
    }

    /// Returns the build environment.
    #[must_use]
    pub fn environment_variables(&self) -> &BTreeMap<String, String> {
        &self.environment_variables
    }

    fn build_event(&self, ctx: &ActionContext, kind: LifecycleEventKind) -> PipelineEvent {
        PipelineEvent::build(kind, &self.project_name, ctx.pipeline_name(), ctx.execution_id())
            .with_stage(ctx.stage_name())
            .with_action(ctx.action_name())
    }
}

impl std::fmt::Debug for BuildAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildAction")
            .field("project_name", &self.project_name)
            .field("build_spec", &self.build_spec)
            .field("environment_variables", &self.environment_variables)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for BuildAction {
    fn name(&self) -> &str {
        "CodeBuild"
    }

    fn category(&self) -> ActionCategory {
        ActionCategory::Build
    }

    fn input_artifacts(&self) -> Vec<String> {
        vec![self.input.clone()]
    }

    fn output_artifacts(&self) -> Vec<String> {
        vec![self.output.clone()]
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        let Some(source) = ctx.artifact(&self.input) else {
            return ActionOutput::failed(format!("Input artifact '{}' is missing", self.input));
        };

        let request = BuildRequest {
            project_name: self.project_name.clone(),
            build_spec: self.build_spec.clone(),
            environment_variables: self.environment_variables.clone(),
            source,
        };

        ctx.publish(BusEvent::Lifecycle(
            self.build_event(ctx, LifecycleEventKind::BuildStateInProgress),
        ));

        match self.invoker.run_build(&request).await {
            Ok(report) => {
                info!(project = %self.project_name, build_id = %report.build_id, "Build succeeded");
                ctx.publish(BusEvent::Lifecycle(
                    self.build_event(ctx, LifecycleEventKind::BuildStateSucceeded),
                ));
                let artifact = Artifact::new(
                    &self.output,
                    ArtifactLocation::Build {
                        project: self.project_name.clone(),
                        build_id: report.build_id.clone(),
                    },
                    &report.output_revision,
                );
                ActionOutput::produced(artifact).with_summary(format!("Build {}", report.build_id))
            }
            Err(e) => {
                warn!(project = %self.project_name, error = %e, "Build failed");
                ctx.publish(BusEvent::Lifecycle(
                    self.build_event(ctx, LifecycleEventKind::BuildStateFailed)
                        .with_detail(e.to_string()),
                ));
                ActionOutput::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventResource;
    use crate::testing::{git_artifact, TestHarness};

    fn action(harness: &TestHarness) -> BuildAction {
        BuildAction::new(
            "docker-build-project-dev",
            "buildspec.backend.yaml",
            "github-artifact-1",
            "codebuild-artifact-1",
            harness.fakes.build.clone(),
        )
        .with_env_var("AWS_ACCOUNT", "123456789012")
        .with_env_var("BUILD_TARGET", "dev")
    }

    #[tokio::test]
    async fn test_build_passes_environment() {
        let harness = TestHarness::new("backend-dev");
        harness.scope.put_artifact(git_artifact("github-artifact-1"));

        let output = action(&harness)
            .execute(&harness.context("BuildAndDeploy", "CodeBuild"))
            .await;

        assert!(output.is_success());
        assert_eq!(output.artifacts[0].name, "codebuild-artifact-1");
        let requests = harness.fakes.build.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].environment_variables["BUILD_TARGET"], "dev");
        assert_eq!(requests[0].source.name, "github-artifact-1");
    }

    #[tokio::test]
    async fn test_build_failure_publishes_build_failed() {
        let harness = TestHarness::new("backend-dev");
        harness.scope.put_artifact(git_artifact("github-artifact-1"));
        harness.fakes.build.fail_with("docker build exited 1");

        let output = action(&harness)
            .execute(&harness.context("BuildAndDeploy", "CodeBuild"))
            .await;
        harness.bus.drain().await;

        assert!(!output.is_success());
        let events = harness.sink.lifecycle();
        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![LifecycleEventKind::BuildStateInProgress, LifecycleEventKind::BuildStateFailed]
        );
        assert_eq!(
            events[1].resource,
            EventResource::BuildProject("docker-build-project-dev".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_input_fails_without_building() {
        let harness = TestHarness::new("backend-dev");

        let output = action(&harness)
            .execute(&harness.context("BuildAndDeploy", "CodeBuild"))
            .await;

        assert!(!output.is_success());
        assert!(harness.fakes.build.requests().is_empty());
    }
}
