//! The lifecycle notifier.

use super::NotificationRule;
use crate::core::{BusEvent, EventResource, LifecycleEventKind, PipelineEvent};
use crate::errors::NotifyError;
use crate::events::EventSink;
use crate::ports::{ChatClient, ChatMessage};
use crate::secrets::SecretString;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

fn decoration(kind: LifecycleEventKind) -> (&'static str, &'static str) {
    match kind {
        LifecycleEventKind::PipelineExecutionSucceeded
        | LifecycleEventKind::StageExecutionSucceeded
        | LifecycleEventKind::ManualApprovalSucceeded
        | LifecycleEventKind::BuildStateSucceeded => (":white_check_mark:", "good"),
        LifecycleEventKind::PipelineExecutionFailed
        | LifecycleEventKind::StageExecutionFailed
        | LifecycleEventKind::ManualApprovalFailed
        | LifecycleEventKind::BuildStateFailed => (":x:", "danger"),
        LifecycleEventKind::ManualApprovalNeeded => (":raised_hand:", "warning"),
        LifecycleEventKind::PipelineExecutionCanceled => (":no_entry_sign:", "warning"),
        LifecycleEventKind::PipelineExecutionStarted
        | LifecycleEventKind::StageExecutionStarted
        | LifecycleEventKind::BuildStateInProgress => (":arrow_forward:", "#439fe0"),
    }
}

/// Renders a lifecycle event for `channel`.
#[must_use]
pub fn render_lifecycle_message(channel: &str, event: &PipelineEvent) -> ChatMessage {
    let (emoji, color) = decoration(event.kind);
    let subject = match &event.resource {
        EventResource::Pipeline(name) => name.clone(),
        EventResource::BuildProject(project) => format!("{project} ({})", event.pipeline_name),
    };
    let text = format!("{emoji} *{}* `{subject}`", event.kind.label());

    let mut fields = vec![json!({
        "title": "Execution",
        "value": event.execution_id.to_string(),
        "short": false,
    })];
    if let Some(stage) = &event.stage {
        let value = match &event.action {
            Some(action) => format!("{stage} / {action}"),
            None => stage.clone(),
        };
        fields.push(json!({ "title": "Stage", "value": value, "short": true }));
    }
    if let Some(detail) = &event.detail {
        fields.push(json!({ "title": "Detail", "value": detail, "short": false }));
    }

    ChatMessage::text(channel, text).with_attachments(vec![json!({
        "color": color,
        "fields": fields,
        "footer": event.kind.event_type_id(),
        "ts_iso": event.timestamp,
    })])
}

/// Delivers lifecycle events that match its rules.
///
/// Every accepted event is posted once per matching rule. There is no
/// dedup, batching or retry.
pub struct LifecycleNotifier {
    rules: Vec<NotificationRule>,
    chat: Arc<dyn ChatClient>,
    token: SecretString,
}

impl LifecycleNotifier {
    /// Creates a notifier posting as the bot identified by `token`.
    #[must_use]
    pub fn new(rules: Vec<NotificationRule>, chat: Arc<dyn ChatClient>, token: SecretString) -> Self {
        Self { rules, chat, token }
    }

    /// Returns the rules.
    #[must_use]
    pub fn rules(&self) -> &[NotificationRule] {
        &self.rules
    }

    /// Delivers `event` under every rule that accepts it.
    ///
    /// Returns the number of messages posted. The first delivery error
    /// aborts the remaining rules.
    pub async fn handle(&self, event: &PipelineEvent) -> Result<usize, NotifyError> {
        let mut delivered = 0;
        for rule in self.rules.iter().filter(|rule| rule.accepts(event)) {
            let message = render_lifecycle_message(&rule.target().channel_id, event);
            let receipt = self
                .chat
                .post_message(&self.token, &message)
                .await
                .map_err(|e| NotifyError::Delivery {
                    channel: message.channel.clone(),
                    reason: e.to_string(),
                })?;
            info!(
                rule = %rule.name(),
                event_type = event.kind.event_type_id(),
                channel = %receipt.channel,
                "Lifecycle notification delivered"
            );
            delivered += 1;
        }

        if delivered == 0 {
            debug!(event_type = event.kind.event_type_id(), resource = %event.resource, "No rule accepts event");
        }
        Ok(delivered)
    }
}

impl std::fmt::Debug for LifecycleNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleNotifier")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventSink for LifecycleNotifier {
    fn name(&self) -> &str {
        "lifecycle-notifier"
    }

    async fn emit(&self, event: &BusEvent) -> Result<(), NotifyError> {
        match event {
            BusEvent::Lifecycle(event) => self.handle(event).await.map(|_| ()),
            BusEvent::ApprovalPending(_) => Ok(()),
        }
    }
}
