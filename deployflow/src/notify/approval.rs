//! The approval notifier: posts the approve/reject message to chat.

use crate::approval::{button_value, APPROVAL_CALLBACK_ID, APPROVE_ACTION_ID, REJECT_ACTION_ID};
use crate::core::{ApprovalEvent, BusEvent};
use crate::errors::NotifyError;
use crate::events::EventSink;
use crate::ports::{ChatClient, ChatMessage, ChatReceipt, OrchestrationService};
use crate::secrets::SecretString;
use crate::utils::{to_offset, Timestamp};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const BUTTON_COLOR: &str = "#258ab5";

/// What the approval message shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDigest {
    /// The pipeline waiting for approval.
    pub pipeline_name: String,
    /// The approval token.
    pub token: Uuid,
    /// Summary of the source revision, normally the commit message.
    pub commit_summary: String,
    /// When the source action last changed status.
    pub committed_at: Timestamp,
}

/// Renders the approval message with its two buttons.
///
/// Times are shown in the given UTC offset as `YYYY-MM-DD HH:MM`.
#[must_use]
pub fn render_approval_message(channel: &str, digest: &ApprovalDigest, utc_offset_hours: i32) -> ChatMessage {
    let time = to_offset(digest.committed_at, utc_offset_hours).format("%Y-%m-%d %H:%M");
    let text = [
        format!("Target commit: `{}`", digest.commit_summary),
        format!("Commit time: `{time}`"),
        String::new(),
        "Choose an action.".to_string(),
    ]
    .join("\n");
    let value = button_value(digest.token, &digest.pipeline_name);

    ChatMessage::text(channel, text).with_attachments(vec![json!({
        "fallback": "Upgrade your Slack client to use messages like these.",
        "color": BUTTON_COLOR,
        "attachment_type": "default",
        "callback_id": APPROVAL_CALLBACK_ID,
        "actions": [
            {
                "action_id": APPROVE_ACTION_ID,
                "name": "ok",
                "text": "Approve",
                "value": value,
                "style": "primary",
                "type": "button",
                "confirm": {
                    "title": "Approve this deployment?",
                    "text": "Are you sure?",
                    "ok_text": "OK",
                    "dismiss_text": "Cancel",
                },
            },
            {
                "action_id": REJECT_ACTION_ID,
                "name": "cancel",
                "text": "Reject",
                "value": value,
                "style": "danger",
                "type": "button",
            },
        ],
    })])
}

/// Posts one approval message per pending approval.
///
/// The message content comes from pipeline state, not from the event: the
/// commit summary from the source action and the token from the approval
/// action. An event whose action execution id is not the approval action's
/// latest attempt is stale and skipped.
pub struct ApprovalNotifier {
    orchestration: Arc<dyn OrchestrationService>,
    chat: Arc<dyn ChatClient>,
    token: SecretString,
    channel_id: String,
    source_stage: String,
    source_action: String,
    utc_offset_hours: i32,
}

impl ApprovalNotifier {
    /// Creates a notifier posting to `channel_id` as the bot identified by
    /// `token`, reading the commit from `source_stage`/`source_action`.
    #[must_use]
    pub fn new(
        orchestration: Arc<dyn OrchestrationService>,
        chat: Arc<dyn ChatClient>,
        token: SecretString,
        channel_id: impl Into<String>,
        source_stage: impl Into<String>,
        source_action: impl Into<String>,
    ) -> Self {
        Self {
            orchestration,
            chat,
            token,
            channel_id: channel_id.into(),
            source_stage: source_stage.into(),
            source_action: source_action.into(),
            utc_offset_hours: crate::config::DEFAULT_NOTIFY_UTC_OFFSET_HOURS,
        }
    }

    /// Sets the UTC offset used for commit times.
    #[must_use]
    pub fn with_utc_offset_hours(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    /// Returns the channel messages go to.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn state_error(&self, event: &ApprovalEvent, reason: impl Into<String>) -> NotifyError {
        NotifyError::State {
            pipeline: event.pipeline_name.clone(),
            reason: reason.into(),
        }
    }

    /// Handles an approval-pending event.
    ///
    /// Returns `None` when the event is stale.
    pub async fn handle(&self, event: &ApprovalEvent) -> Result<Option<ChatReceipt>, NotifyError> {
        let state = self
            .orchestration
            .pipeline_state(&event.pipeline_name)
            .await
            .map_err(|e| self.state_error(event, e.to_string()))?;

        let approval = state
            .latest_execution(&event.stage_name, &event.action_name)
            .filter(|latest| latest.action_execution_id == event.action_execution_id);
        let Some(approval) = approval else {
            debug!(
                pipeline = %event.pipeline_name,
                action_execution_id = %event.action_execution_id,
                "Skipping stale approval event"
            );
            return Ok(None);
        };
        let token = approval
            .token
            .ok_or_else(|| self.state_error(event, "approval action has no token"))?;

        let source = state
            .latest_execution(&self.source_stage, &self.source_action)
            .ok_or_else(|| {
                self.state_error(event, format!("no execution of {}/{}", self.source_stage, self.source_action))
            })?;
        let digest = ApprovalDigest {
            pipeline_name: event.pipeline_name.clone(),
            token,
            commit_summary: source.summary.clone().unwrap_or_default(),
            committed_at: source.last_status_change,
        };

        let message = render_approval_message(&self.channel_id, &digest, self.utc_offset_hours);
        let receipt = self
            .chat
            .post_message(&self.token, &message)
            .await
            .map_err(|e| NotifyError::Delivery {
                channel: self.channel_id.clone(),
                reason: e.to_string(),
            })?;
        info!(
            pipeline = %event.pipeline_name,
            execution_id = %event.execution_id,
            channel = %receipt.channel,
            "Approval request posted"
        );
        Ok(Some(receipt))
    }
}

impl std::fmt::Debug for ApprovalNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalNotifier")
            .field("channel_id", &self.channel_id)
            .field("source_stage", &self.source_stage)
            .field("source_action", &self.source_action)
            .field("utc_offset_hours", &self.utc_offset_hours)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventSink for ApprovalNotifier {
    fn name(&self) -> &str {
        "approval-notifier"
    }

    async fn emit(&self, event: &BusEvent) -> Result<(), NotifyError> {
        match event {
            BusEvent::ApprovalPending(event) => self.handle(event).await.map(|_| ()),
            BusEvent::Lifecycle(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalReply;
    use crate::cancellation::CancellationToken;
    use crate::core::ActionStatus;
    use crate::pipeline::{InMemoryOrchestrator, StageLayout};
    use crate::ports::MockChatClient;
    use crate::testing::UnavailableOrchestration;
    use chrono::TimeZone;

    fn layout() -> Vec<StageLayout> {
        vec![
            StageLayout {
                stage_name: "Source".to_string(),
                action_names: vec!["GitHubSource".to_string()],
            },
            StageLayout {
                stage_name: "BuildAndDeployApproval".to_string(),
                action_names: vec!["deployApprovalAction".to_string()],
            },
        ]
    }

    fn registry_with_approval(token: Uuid) -> (Arc<InMemoryOrchestrator>, ApprovalEvent) {
        let registry = Arc::new(InMemoryOrchestrator::new());
        let execution_id = Uuid::new_v4();
        registry.register("backend-dev", execution_id, &layout(), Arc::new(CancellationToken::new()));
        registry.record_action_started("backend-dev", "Source", "GitHubSource", "src-1");
        registry.record_action_finished(
            "backend-dev",
            "Source",
            "GitHubSource",
            "src-1",
            ActionStatus::Succeeded,
            Some("Add health check".to_string()),
        );
        registry.record_action_started("backend-dev", "BuildAndDeployApproval", "deployApprovalAction", "appr-1");
        registry.attach_token("backend-dev", "BuildAndDeployApproval", "deployApprovalAction", "appr-1", token);

        let event = ApprovalEvent {
            pipeline_name: "backend-dev".to_string(),
            execution_id,
            stage_name: "BuildAndDeployApproval".to_string(),
            action_name: "deployApprovalAction".to_string(),
            action_execution_id: "appr-1".to_string(),
            token,
            requested_at: crate::utils::iso_timestamp(),
        };
        (registry, event)
    }

    fn notifier(registry: Arc<dyn OrchestrationService>, chat: MockChatClient) -> ApprovalNotifier {
        ApprovalNotifier::new(
            registry,
            Arc::new(chat),
            SecretString::new("xoxb-test"),
            "C0123456789",
            "Source",
            "GitHubSource",
        )
    }

    #[tokio::test]
    async fn test_posts_message_with_token() {
        let token = Uuid::new_v4();
        let (registry, event) = registry_with_approval(token);
        let mut chat = MockChatClient::new();
        chat.expect_post_message()
            .withf(move |_, message| {
                message.channel == "C0123456789"
                    && message.text.contains("`Add health check`")
                    && message.attachments[0]["actions"][0]["value"] == format!("{token},backend-dev")
            })
            .times(1)
            .returning(|_, message| {
                Ok(ChatReceipt {
                    channel: message.channel.clone(),
                    ts: "1.0".to_string(),
                })
            });

        let receipt = notifier(registry, chat).handle(&event).await.unwrap();
        assert_eq!(receipt.unwrap().channel, "C0123456789");
    }

    #[tokio::test]
    async fn test_stale_event_is_skipped() {
        let (registry, mut event) = registry_with_approval(Uuid::new_v4());
        event.action_execution_id = "appr-0".to_string();
        let mut chat = MockChatClient::new();
        chat.expect_post_message().times(0);

        assert!(notifier(registry, chat).handle(&event).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_state_is_an_error() {
        let (_, event) = registry_with_approval(Uuid::new_v4());
        let mut chat = MockChatClient::new();
        chat.expect_post_message().times(0);

        let err = notifier(Arc::new(UnavailableOrchestration), chat)
            .emit(&BusEvent::ApprovalPending(event))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::State { .. }));
    }

    #[test]
    fn test_render_approval_message() {
        let token = Uuid::new_v4();
        let digest = ApprovalDigest {
            pipeline_name: "backend-dev".to_string(),
            token,
            commit_summary: "Fix login".to_string(),
            committed_at: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap(),
        };

        let message = render_approval_message("C1", &digest, 9);

        assert_eq!(
            message.text,
            "Target commit: `Fix login`\nCommit time: `2024-03-02 08:30`\n\nChoose an action."
        );
        let attachment = &message.attachments[0];
        assert_eq!(attachment["callback_id"], "codepipeline_manual_approval");
        assert_eq!(attachment["color"], "#258ab5");
        let approve = &attachment["actions"][0];
        let reject = &attachment["actions"][1];
        assert!(approve["confirm"].is_object());

        // Both buttons round-trip through the reply parser.
        let reply = ApprovalReply::parse(
            approve["action_id"].as_str().unwrap(),
            approve["value"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(reply.token, token);
        assert_eq!(reply.pipeline_name, "backend-dev");
        assert!(ApprovalReply::parse(reject["action_id"].as_str().unwrap(), reject["value"].as_str().unwrap()).is_ok());
    }
}
