//! The manual approval gate and its chat reply side.

mod reply;
mod service;

pub use reply::{
    button_value, ApprovalReply, ApprovalResponder, APPROVAL_CALLBACK_ID, APPROVE_ACTION_ID,
    REJECT_ACTION_ID,
};
pub use service::{
    ApprovalDecision, ApprovalResolution, ApprovalService, ApprovalState, ApprovalTicket,
    ApprovalTimeout, PendingApproval, DEFAULT_RESOLVED_HISTORY,
};
