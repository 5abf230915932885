//! Action, stage and execution status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of provider an action delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    /// Produces an artifact from a source provider (git, object storage).
    Source,
    /// Invokes an external function (pre-flight checks, autoscaling hooks).
    Invoke,
    /// Blocks until a human approves or rejects.
    Approval,
    /// Runs a managed build job.
    Build,
    /// Performs a service deployment.
    Deploy,
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Invoke => write!(f, "invoke"),
            Self::Approval => write!(f, "approval"),
            Self::Build => write!(f, "build"),
            Self::Deploy => write!(f, "deploy"),
        }
    }
}

/// The status of a single action, or of a stage as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The action is running (or, for approvals, waiting).
    #[default]
    InProgress,
    /// The action completed successfully.
    Succeeded,
    /// The action failed.
    Failed,
    /// A human rejected the approval.
    Rejected,
    /// The execution was stopped while the action was active.
    Stopped,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl ActionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Ranks terminal outcomes so the worst one in a run-order group wins.
    pub(crate) fn severity(self) -> u8 {
        match self {
            Self::Succeeded => 0,
            Self::InProgress => 1,
            Self::Rejected => 2,
            Self::Stopped => 3,
            Self::Failed => 4,
        }
    }
}

/// The status of a pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The execution is running.
    #[default]
    InProgress,
    /// Every stage succeeded.
    Succeeded,
    /// A stage failed.
    Failed,
    /// The execution was stopped by a newer execution.
    Stopped,
    /// The approval gate was rejected; later stages never ran.
    Rejected,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Stopped => write!(f, "stopped"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl ExecutionStatus {
    /// Returns true once the execution can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl From<ActionStatus> for ExecutionStatus {
    fn from(status: ActionStatus) -> Self {
        match status {
            ActionStatus::InProgress => Self::InProgress,
            ActionStatus::Succeeded => Self::Succeeded,
            ActionStatus::Failed => Self::Failed,
            ActionStatus::Rejected => Self::Rejected,
            ActionStatus::Stopped => Self::Stopped,
        }
    }
}
