//! Chat replies to approval messages.
//!
//! The approval message carries two buttons whose value is
//! `"{token},{pipeline name}"`. A button press comes back as an action id
//! plus that value.

use super::service::{ApprovalDecision, ApprovalService, ApprovalState};
use crate::errors::ApprovalError;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Callback id shared by both approval buttons.
pub const APPROVAL_CALLBACK_ID: &str = "codepipeline_manual_approval";

/// Action id of the approve button.
pub const APPROVE_ACTION_ID: &str = "codepipeline_manual_approval_ok";

/// Action id of the reject button.
pub const REJECT_ACTION_ID: &str = "codepipeline_manual_approval_cancel";

/// Builds the value both buttons carry.
#[must_use]
pub fn button_value(token: Uuid, pipeline_name: &str) -> String {
    format!("{token},{pipeline_name}")
}

/// A parsed button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalReply {
    /// The approval token.
    pub token: Uuid,
    /// The pipeline named in the button value.
    pub pipeline_name: String,
    /// Which button was pressed.
    pub decision: ApprovalDecision,
}

impl ApprovalReply {
    /// Parses a button press.
    pub fn parse(action_id: &str, value: &str) -> Result<Self, ApprovalError> {
        let decision = match action_id {
            APPROVE_ACTION_ID => ApprovalDecision::Approve,
            REJECT_ACTION_ID => ApprovalDecision::Reject,
            other => {
                return Err(ApprovalError::MalformedReply(format!(
                    "unknown action id '{other}'"
                )))
            }
        };

        let (token, pipeline_name) = value.split_once(',').ok_or_else(|| {
            ApprovalError::MalformedReply(format!("expected 'token,pipeline', got '{value}'"))
        })?;
        let token = Uuid::parse_str(token.trim())
            .map_err(|e| ApprovalError::MalformedReply(format!("bad token: {e}")))?;
        let pipeline_name = pipeline_name.trim();
        if pipeline_name.is_empty() {
            return Err(ApprovalError::MalformedReply("missing pipeline name".to_string()));
        }

        Ok(Self {
            token,
            pipeline_name: pipeline_name.to_string(),
            decision,
        })
    }
}

/// Applies chat replies to the approval service.
#[derive(Debug, Clone)]
pub struct ApprovalResponder {
    approvals: Arc<ApprovalService>,
}

impl ApprovalResponder {
    /// Creates a responder over an approval service.
    #[must_use]
    pub fn new(approvals: Arc<ApprovalService>) -> Self {
        Self { approvals }
    }

    /// Parses a button press and resolves the matching approval.
    pub fn respond(&self, action_id: &str, value: &str) -> Result<ApprovalState, ApprovalError> {
        let reply = ApprovalReply::parse(action_id, value)?;
        match self
            .approvals
            .decide(reply.token, &reply.pipeline_name, reply.decision)
        {
            Ok(state) => {
                info!(pipeline = %reply.pipeline_name, state = %state, "Approval reply applied");
                Ok(state)
            }
            Err(e) => {
                warn!(pipeline = %reply.pipeline_name, error = %e, "Approval reply refused");
                Err(e)
            }
        }
    }
}
