//! Source actions: the git checkout and the task-definition object.

use super::{Action, ActionContext};
use crate::core::{ActionCategory, ActionOutput, Artifact, ArtifactLocation};
use crate::ports::{GitCheckout, GitSourceProvider, ObjectSourceProvider};
use crate::secrets::SecretString;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Checks out the head of the configured branch.
pub struct GitSourceAction {
    name: String,
    checkout: GitCheckout,
    token: SecretString,
    output: String,
    provider: Arc<dyn GitSourceProvider>,
}

impl GitSourceAction {
    /// Creates the action; `output` names the produced artifact.
    #[must_use]
    pub fn new(
        checkout: GitCheckout,
        token: SecretString,
        output: impl Into<String>,
        provider: Arc<dyn GitSourceProvider>,
    ) -> Self {
        Self {
            name: "GitHubSource".to_string(),
            checkout,
            token,
            output: output.into(),
            provider,
        }
    }

    /// Returns what is checked out.
    #[must_use]
    pub fn checkout(&self) -> &GitCheckout {
        &self.checkout
    }
}

impl std::fmt::Debug for GitSourceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitSourceAction")
            .field("name", &self.name)
            .field("checkout", &self.checkout)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for GitSourceAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> ActionCategory {
        ActionCategory::Source
    }

    fn output_artifacts(&self) -> Vec<String> {
        vec![self.output.clone()]
    }

    async fn execute(&self, _ctx: &ActionContext) -> ActionOutput {
        match self.provider.checkout(&self.checkout, &self.token).await {
            Ok(revision) => {
                info!(
                    owner = %self.checkout.owner,
                    repository = %self.checkout.repository,
                    branch = %self.checkout.branch,
                    commit = %revision.commit,
                    "Checked out source"
                );
                let artifact = Artifact::new(
                    &self.output,
                    ArtifactLocation::Git {
                        owner: self.checkout.owner.clone(),
                        repository: self.checkout.repository.clone(),
                        commit: revision.commit.clone(),
                    },
                    &revision.commit,
                )
                .with_summary(&revision.message)
                .with_content(revision.commit.as_bytes());

                ActionOutput::produced(artifact).with_summary(revision.message)
            }
            Err(e) => {
                warn!(branch = %self.checkout.branch, error = %e, "Source checkout failed");
                ActionOutput::failed(e.to_string())
            }
        }
    }
}

/// Reads the task-definition bundle from object storage.
pub struct ObjectSourceAction {
    name: String,
    bucket: String,
    key: String,
    output: String,
    provider: Arc<dyn ObjectSourceProvider>,
}

impl ObjectSourceAction {
    /// Creates the action; `output` names the produced artifact.
    #[must_use]
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        output: impl Into<String>,
        provider: Arc<dyn ObjectSourceProvider>,
    ) -> Self {
        Self {
            name: "backend-taskdef-from-s3".to_string(),
            bucket: bucket.into(),
            key: key.into(),
            output: output.into(),
            provider,
        }
    }
}

impl std::fmt::Debug for ObjectSourceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectSourceAction")
            .field("name", &self.name)
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for ObjectSourceAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> ActionCategory {
        ActionCategory::Source
    }

    fn output_artifacts(&self) -> Vec<String> {
        vec![self.output.clone()]
    }

    async fn execute(&self, _ctx: &ActionContext) -> ActionOutput {
        match self.provider.fetch(&self.bucket, &self.key).await {
            Ok(object) => {
                let artifact = Artifact::new(
                    &self.output,
                    ArtifactLocation::Object {
                        bucket: self.bucket.clone(),
                        key: self.key.clone(),
                    },
                    &object.version_id,
                )
                .with_content(&object.content);

                ActionOutput::produced(artifact)
                    .with_summary(format!("{}/{} version {}", self.bucket, self.key, object.version_id))
            }
            Err(e) => {
                warn!(bucket = %self.bucket, key = %self.key, error = %e, "Object fetch failed");
                ActionOutput::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestHarness, TASKDEF_BUNDLE};

    #[tokio::test]
    async fn test_git_source_produces_artifact() {
        let harness = TestHarness::new("backend-dev");
        let action = GitSourceAction::new(
            GitCheckout {
                owner: "example-org".to_string(),
                repository: "backend".to_string(),
                branch: "develop".to_string(),
            },
            SecretString::new("ghp_secret"),
            "github-artifact-123456789012",
            harness.fakes.git.clone(),
        );

        let output = action.execute(&harness.context("Source", "GitHubSource")).await;

        assert!(output.is_success());
        let artifact = &output.artifacts[0];
        assert_eq!(artifact.name, "github-artifact-123456789012");
        assert_eq!(artifact.summary.as_deref(), Some("Add health check"));
        assert!(artifact.digest.is_some());
        assert_eq!(harness.journal.calls(), vec!["git.checkout develop".to_string()]);
    }

    #[tokio::test]
    async fn test_git_source_failure() {
        let harness = TestHarness::new("backend-dev");
        harness.fakes.git.fail_with("bad credentials");
        let action = GitSourceAction::new(
            GitCheckout {
                owner: "o".to_string(),
                repository: "r".to_string(),
                branch: "develop".to_string(),
            },
            SecretString::new("bad"),
            "github-artifact-1",
            harness.fakes.git.clone(),
        );

        let output = action.execute(&harness.context("Source", "GitHubSource")).await;

        assert!(!output.is_success());
        assert!(output.error.unwrap().contains("bad credentials"));
    }

    #[tokio::test]
    async fn test_object_source_records_digest() {
        let harness = TestHarness::new("backend-dev");
        let action = ObjectSourceAction::new(
            "cicd-dev",
            "backend_taskdef/taskdef.dev.json.zip",
            "s3-artifact-1",
            harness.fakes.objects.clone(),
        );

        let output = action.execute(&harness.context("Source", "backend-taskdef-from-s3")).await;

        assert!(output.is_success());
        assert_eq!(
            output.artifacts[0].digest,
            Some(crate::utils::sha256_hex(TASKDEF_BUNDLE))
        );
        assert_eq!(
            harness.journal.calls(),
            vec!["objects.fetch cicd-dev/backend_taskdef/taskdef.dev.json.zip".to_string()]
        );
    }
}
