//! The trigger rule: starts the pipeline on a matching push event.

use crate::config::PipelineConfig;
use crate::errors::DeployflowError;
use crate::pipeline::{ExecutionHandle, ExecutionTrigger, PipelineRunner};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

/// Payload of an inbound push event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushDetail {
    /// The pushed ref, e.g. `refs/heads/develop`.
    #[serde(rename = "git-branch", default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
}

/// An event arriving on the trigger surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Source tag.
    pub source: String,
    /// Detail-type tag.
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    /// Event payload.
    #[serde(default)]
    pub detail: PushDetail,
}

impl InboundEvent {
    /// Creates a push event for a ref.
    #[must_use]
    pub fn push(source: impl Into<String>, detail_type: impl Into<String>, git_ref: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            detail_type: detail_type.into(),
            detail: PushDetail {
                git_branch: Some(git_ref.into()),
            },
        }
    }

    /// Parses an event from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, DeployflowError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A predicate over inbound events.
///
/// Fires iff source and detail-type equal the configured tags and the
/// pushed ref equals `refs/heads/{branch}` exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRule {
    name: String,
    source: String,
    detail_type: String,
    git_ref: String,
}

impl TriggerRule {
    /// Creates a rule for `branch`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        detail_type: impl Into<String>,
        branch: &str,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            detail_type: detail_type.into(),
            git_ref: format!("refs/heads/{branch}"),
        }
    }

    /// Creates the rule for a pipeline configuration.
    #[must_use]
    pub fn for_config(config: &PipelineConfig) -> Self {
        let params = config.params();
        Self::new(
            config.trigger_rule_name(),
            &params.trigger.source,
            &params.trigger.detail_type,
            &params.source.git.branch,
        )
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ref the rule fires on.
    #[must_use]
    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    /// Returns whether `event` starts the pipeline.
    #[must_use]
    pub fn matches(&self, event: &InboundEvent) -> bool {
        event.source == self.source
            && event.detail_type == self.detail_type
            && event.detail.git_branch.as_deref() == Some(self.git_ref.as_str())
    }

    /// Renders the rule as an event pattern.
    #[must_use]
    pub fn event_pattern(&self) -> serde_json::Value {
        json!({
            "source": [self.source],
            "detail-type": [self.detail_type],
            "detail": { "git-branch": [self.git_ref] },
        })
    }

    /// Starts an execution on `runner` if `event` matches.
    pub fn dispatch(&self, event: &InboundEvent, runner: &PipelineRunner) -> Option<ExecutionHandle> {
        if !self.matches(event) {
            debug!(
                rule = %self.name,
                source = %event.source,
                detail_type = %event.detail_type,
                git_branch = ?event.detail.git_branch,
                "Event does not match trigger rule"
            );
            return None;
        }

        let handle = runner.start(ExecutionTrigger::Rule {
            rule: self.name.clone(),
            git_ref: self.git_ref.clone(),
        });
        info!(
            rule = %self.name,
            pipeline = %runner.definition().name(),
            execution_id = %handle.execution_id,
            "Trigger rule fired"
        );
        Some(handle)
    }
}
