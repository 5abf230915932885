//! The manual approval gate.

use super::{Action, ActionContext};
use crate::approval::{ApprovalResolution, ApprovalService, ApprovalTimeout};
use crate::core::{ActionCategory, ActionOutput, ApprovalEvent, BusEvent, LifecycleEventKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Blocks the execution until the deployment is approved or rejected.
pub struct ManualApprovalAction {
    approvals: Arc<ApprovalService>,
    timeout: Option<ApprovalTimeout>,
}

impl ManualApprovalAction {
    /// Creates the action; without a timeout it waits indefinitely.
    #[must_use]
    pub fn new(approvals: Arc<ApprovalService>, timeout: Option<ApprovalTimeout>) -> Self {
        Self { approvals, timeout }
    }
}

impl std::fmt::Debug for ManualApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualApprovalAction")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for ManualApprovalAction {
    fn name(&self) -> &str {
        "deployApprovalAction"
    }

    fn category(&self) -> ActionCategory {
        ActionCategory::Approval
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        let ticket = self.approvals.request(ctx.pipeline_name(), ctx.execution_id());
        let token = ticket.token();

        // The notifier reads the token back from pipeline state.
        ctx.scope().registry().attach_token(
            ctx.pipeline_name(),
            ctx.stage_name(),
            ctx.action_name(),
            ctx.action_execution_id(),
            token,
        );

        ctx.publish(BusEvent::Lifecycle(
            ctx.lifecycle_event(LifecycleEventKind::ManualApprovalNeeded),
        ));
        ctx.publish(BusEvent::ApprovalPending(ApprovalEvent {
            pipeline_name: ctx.pipeline_name().to_string(),
            execution_id: ctx.execution_id(),
            stage_name: ctx.stage_name().to_string(),
            action_name: ctx.action_name().to_string(),
            action_execution_id: ctx.action_execution_id().to_string(),
            token,
            requested_at: crate::utils::iso_timestamp(),
        }));
        info!(
            pipeline = %ctx.pipeline_name(),
            execution_id = %ctx.execution_id(),
            "Waiting for deployment approval"
        );

        let resolution = self.approvals.wait(ticket, self.timeout, ctx.cancel_token()).await;
        if let ApprovalResolution::Stopped { reason } = resolution {
            info!(pipeline = %ctx.pipeline_name(), reason = %reason, "Approval wait ended by stop");
            return ActionOutput::stopped(reason);
        }

        let timed_out = matches!(resolution, ApprovalResolution::TimedOut(_));
        if resolution.is_approved() {
            ctx.publish(BusEvent::Lifecycle(
                ctx.lifecycle_event(LifecycleEventKind::ManualApprovalSucceeded),
            ));
            ActionOutput::succeeded().with_summary(if timed_out { "Approved on timeout" } else { "Approved" })
        } else {
            ctx.publish(BusEvent::Lifecycle(
                ctx.lifecycle_event(LifecycleEventKind::ManualApprovalFailed),
            ));
            ActionOutput::rejected(if timed_out { "Rejected on timeout" } else { "Rejected" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalDecision;
    use crate::core::ActionStatus;
    use crate::testing::TestHarness;
    use std::time::Duration;

    async fn wait_for_pending(approvals: &ApprovalService) -> uuid::Uuid {
        for _ in 0..100 {
            if let Some(pending) = approvals.pending().first() {
                return pending.token;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("approval never became pending");
    }

    #[tokio::test]
    async fn test_approved_gate_succeeds() {
        let harness = TestHarness::new("backend-dev");
        let action = ManualApprovalAction::new(harness.approvals.clone(), None);
        let ctx = harness.context("BuildAndDeployApproval", "deployApprovalAction");

        let run = tokio::spawn(async move { action.execute(&ctx).await });
        let token = wait_for_pending(&harness.approvals).await;
        harness.approvals.approve(token).unwrap();

        let output = run.await.unwrap();
        assert_eq!(output.status, ActionStatus::Succeeded);

        harness.bus.drain().await;
        assert_eq!(
            harness.sink.lifecycle_kinds(),
            vec![
                LifecycleEventKind::ManualApprovalNeeded,
                LifecycleEventKind::ManualApprovalSucceeded,
            ]
        );
        let approvals = harness.sink.approvals();
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].token, token);
    }

    #[tokio::test]
    async fn test_rejected_gate() {
        let harness = TestHarness::new("backend-dev");
        let action = ManualApprovalAction::new(harness.approvals.clone(), None);
        let ctx = harness.context("BuildAndDeployApproval", "deployApprovalAction");

        let run = tokio::spawn(async move { action.execute(&ctx).await });
        let token = wait_for_pending(&harness.approvals).await;
        harness.approvals.reject(token).unwrap();

        assert_eq!(run.await.unwrap().status, ActionStatus::Rejected);
    }

    #[tokio::test]
    async fn test_timeout_outcome() {
        let harness = TestHarness::new("backend-dev");
        let timeout = ApprovalTimeout {
            after: Duration::from_millis(10),
            outcome: ApprovalDecision::Approve,
        };
        let action = ManualApprovalAction::new(harness.approvals.clone(), Some(timeout));

        let output = action
            .execute(&harness.context("BuildAndDeployApproval", "deployApprovalAction"))
            .await;

        assert_eq!(output.status, ActionStatus::Succeeded);
        assert_eq!(output.summary.as_deref(), Some("Approved on timeout"));
    }

    #[tokio::test]
    async fn test_stop_ends_wait() {
        let harness = TestHarness::new("backend-dev");
        let action = ManualApprovalAction::new(harness.approvals.clone(), None);
        let ctx = harness.context("BuildAndDeployApproval", "deployApprovalAction");

        let run = tokio::spawn(async move { action.execute(&ctx).await });
        wait_for_pending(&harness.approvals).await;
        harness.scope.cancel_token().cancel("Superseded");

        let output = run.await.unwrap();
        assert_eq!(output.status, ActionStatus::Stopped);
        assert_eq!(harness.approvals.pending_count(), 0);
    }
}
