//! Records of finished executions.

use crate::core::{ActionOutput, ActionStatus, Artifact, ExecutionStatus};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What started an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionTrigger {
    /// The trigger rule matched a push event.
    Rule {
        /// Name of the rule that fired.
        rule: String,
        /// The pushed ref.
        git_ref: String,
    },
    /// Someone started the pipeline by hand.
    Manual {
        /// Who started it.
        actor: String,
    },
}

impl fmt::Display for ExecutionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule { rule, git_ref } => write!(f, "rule {rule} ({git_ref})"),
            Self::Manual { actor } => write!(f, "manual ({actor})"),
        }
    }
}

/// The outcome of one action attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// The action name.
    pub action_name: String,
    /// Its run order.
    pub run_order: u32,
    /// Id of the attempt.
    pub action_execution_id: String,
    /// What the action reported.
    pub output: ActionOutput,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
}

/// The outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage name.
    pub stage_name: String,
    /// Worst action status; `succeeded` only if every action succeeded.
    pub status: ActionStatus,
    /// Actions that ran, grouped by run order.
    pub actions: Vec<ActionResult>,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
}

impl StageResult {
    /// Looks up an action result.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionResult> {
        self.actions.iter().find(|result| result.action_name == name)
    }

    /// Returns the first error reported by an action.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.actions.iter().find_map(|result| result.output.error.as_deref())
    }
}

/// A finished pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineExecution {
    /// The pipeline name.
    pub pipeline_name: String,
    /// The execution id.
    pub execution_id: Uuid,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// What started it.
    pub trigger: ExecutionTrigger,
    /// Stages that ran, in order. Stages after the one that ended the
    /// execution are absent.
    pub stages: Vec<StageResult>,
    /// When the execution started.
    pub started_at: Timestamp,
    /// When it reached its terminal status.
    pub finished_at: Timestamp,
}

impl PipelineExecution {
    /// Looks up a stage result.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|stage| stage.stage_name == name)
    }

    /// Names of the stages that ran.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.stage_name.as_str()).collect()
    }

    /// Every artifact produced during the execution.
    #[must_use]
    pub fn artifacts(&self) -> Vec<&Artifact> {
        self.stages
            .iter()
            .flat_map(|stage| stage.actions.iter())
            .flat_map(|action| action.output.artifacts.iter())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArtifactLocation;

    fn execution() -> PipelineExecution {
        let artifact = Artifact::new(
            "github-artifact-1",
            ArtifactLocation::Git {
                owner: "o".to_string(),
                repository: "r".to_string(),
                commit: "abc".to_string(),
            },
            "abc",
        );
        PipelineExecution {
            pipeline_name: "backend-dev".to_string(),
            execution_id: Uuid::nil(),
            status: ExecutionStatus::Failed,
            trigger: ExecutionTrigger::Manual {
                actor: "ops".to_string(),
            },
            stages: vec![
                StageResult {
                    stage_name: "Source".to_string(),
                    status: ActionStatus::Succeeded,
                    actions: vec![ActionResult {
                        action_name: "GitHubSource".to_string(),
                        run_order: 1,
                        action_execution_id: "a-1".to_string(),
                        output: ActionOutput::produced(artifact),
                        duration_ms: 1.0,
                    }],
                    duration_ms: 1.0,
                },
                StageResult {
                    stage_name: "StopPreviousExecution".to_string(),
                    status: ActionStatus::Failed,
                    actions: vec![ActionResult {
                        action_name: "stopPreviousExecution".to_string(),
                        run_order: 1,
                        action_execution_id: "a-2".to_string(),
                        output: ActionOutput::failed("throttled"),
                        duration_ms: 1.0,
                    }],
                    duration_ms: 1.0,
                },
            ],
            started_at: crate::utils::now_utc(),
            finished_at: crate::utils::now_utc(),
        }
    }

    #[test]
    fn test_lookups() {
        let execution = execution();
        assert_eq!(execution.stage_names(), vec!["Source", "StopPreviousExecution"]);
        assert_eq!(execution.artifacts().len(), 1);
        let stage = execution.stage("StopPreviousExecution").unwrap();
        assert_eq!(stage.first_error(), Some("throttled"));
        assert!(stage.action("stopPreviousExecution").is_some());
        assert!(execution.stage("DeployEcs").is_none());
    }

    #[test]
    fn test_trigger_serialization() {
        let trigger = ExecutionTrigger::Rule {
            rule: "backend-pipeline-trigger-event-dev".to_string(),
            git_ref: "refs/heads/develop".to_string(),
        };
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["kind"], "rule");
        assert_eq!(trigger.to_string(), "rule backend-pipeline-trigger-event-dev (refs/heads/develop)");
    }
}
