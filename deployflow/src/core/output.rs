//! Action output type with factory methods.

use super::{ActionStatus, Artifact};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The output of an action execution.
///
/// `ActionOutput` is immutable once created; use the factory methods to
/// build outputs with different statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// The terminal status of the action.
    pub status: ActionStatus,

    /// Artifacts produced by the action.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    /// Human-readable summary (shown in the pipeline state).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Error or rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for ActionOutput {
    fn default() -> Self {
        Self::succeeded()
    }
}

impl ActionOutput {
    fn with_status(status: ActionStatus, error: Option<String>) -> Self {
        Self {
            status,
            artifacts: Vec::new(),
            summary: None,
            error,
            metadata: HashMap::new(),
        }
    }

    /// Creates a successful output.
    #[must_use]
    pub fn succeeded() -> Self {
        Self::with_status(ActionStatus::Succeeded, None)
    }

    /// Creates a successful output carrying one artifact.
    #[must_use]
    pub fn produced(artifact: Artifact) -> Self {
        Self::succeeded().with_artifacts(vec![artifact])
    }

    /// Creates a failure output.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Failed, Some(error.into()))
    }

    /// Creates a rejection output.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Rejected, Some(reason.into()))
    }

    /// Creates a stopped output.
    #[must_use]
    pub fn stopped(reason: impl Into<String>) -> Self {
        Self::with_status(ActionStatus::Stopped, Some(reason.into()))
    }

    /// Sets the artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Sets the summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the output indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArtifactLocation;

    #[test]
    fn test_succeeded_output() {
        let output = ActionOutput::succeeded();
        assert_eq!(output.status, ActionStatus::Succeeded);
        assert!(output.is_success());
        assert!(output.error.is_none());
    }

    #[test]
    fn test_failed_output() {
        let output = ActionOutput::failed("build exploded");
        assert_eq!(output.status, ActionStatus::Failed);
        assert_eq!(output.error.as_deref(), Some("build exploded"));
        assert!(!output.is_success());
    }

    #[test]
    fn test_rejected_and_stopped() {
        assert_eq!(ActionOutput::rejected("no").status, ActionStatus::Rejected);
        assert_eq!(ActionOutput::stopped("newer run").status, ActionStatus::Stopped);
    }

    #[test]
    fn test_produced_carries_artifact() {
        let artifact = Artifact::new(
            "codebuild-artifact-1",
            ArtifactLocation::Build {
                project: "p".to_string(),
                build_id: "b-1".to_string(),
            },
            "b-1",
        );
        let output = ActionOutput::produced(artifact).add_metadata("build_id", serde_json::json!("b-1"));
        assert_eq!(output.artifacts.len(), 1);
        assert_eq!(output.metadata.get("build_id"), Some(&serde_json::json!("b-1")));
    }

    #[test]
    fn test_serialization_skips_empty() {
        let json = serde_json::to_value(ActionOutput::succeeded()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "succeeded"}));
    }
}
