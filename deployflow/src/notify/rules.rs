//! Notification rules: which lifecycle events reach which chat target.

use crate::config::PipelineConfig;
use crate::core::{EventResource, LifecycleEventKind, PipelineEvent};
use serde::{Deserialize, Serialize};

/// Where a rule delivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTarget {
    /// Chat configuration the rule is bound to.
    pub configuration_arn: String,
    /// Channel messages are posted to.
    pub channel_id: String,
}

impl ChatTarget {
    /// Creates the target configured for a pipeline.
    #[must_use]
    pub fn for_config(config: &PipelineConfig) -> Self {
        let slack = &config.params().slack;
        Self {
            configuration_arn: slack.configuration_arn.clone(),
            channel_id: slack.channel_id.clone(),
        }
    }
}

/// Subscribes a chat target to some event kinds of one resource.
///
/// Fields are private; a rule cannot change once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRule {
    name: String,
    resource: EventResource,
    event_kinds: Vec<LifecycleEventKind>,
    target: ChatTarget,
}

impl NotificationRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        resource: EventResource,
        event_kinds: impl IntoIterator<Item = LifecycleEventKind>,
        target: ChatTarget,
    ) -> Self {
        let mut kinds: Vec<LifecycleEventKind> = Vec::new();
        for kind in event_kinds {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Self {
            name: name.into(),
            resource,
            event_kinds: kinds,
            target,
        }
    }

    /// The pipeline rule: started, succeeded, failed and approval needed.
    ///
    /// Canceled executions are not included.
    #[must_use]
    pub fn pipeline_rule(config: &PipelineConfig) -> Self {
        Self::new(
            config.pipeline_notification_rule_name(),
            EventResource::Pipeline(config.pipeline_name()),
            [
                LifecycleEventKind::PipelineExecutionSucceeded,
                LifecycleEventKind::PipelineExecutionFailed,
                LifecycleEventKind::PipelineExecutionStarted,
                LifecycleEventKind::ManualApprovalNeeded,
            ],
            ChatTarget::for_config(config),
        )
    }

    /// The build rule: failed builds only.
    #[must_use]
    pub fn build_rule(config: &PipelineConfig) -> Self {
        Self::new(
            config.build_notification_rule_name(),
            EventResource::BuildProject(config.build_project_name()),
            [LifecycleEventKind::BuildStateFailed],
            ChatTarget::for_config(config),
        )
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the watched resource.
    #[must_use]
    pub fn resource(&self) -> &EventResource {
        &self.resource
    }

    /// Returns the subscribed kinds.
    #[must_use]
    pub fn event_kinds(&self) -> &[LifecycleEventKind] {
        &self.event_kinds
    }

    /// Returns the provider event type ids of the subscribed kinds.
    #[must_use]
    pub fn event_type_ids(&self) -> Vec<&'static str> {
        self.event_kinds.iter().map(LifecycleEventKind::event_type_id).collect()
    }

    /// Returns the delivery target.
    #[must_use]
    pub fn target(&self) -> &ChatTarget {
        &self.target
    }

    /// Returns whether `event` should be delivered under this rule.
    #[must_use]
    pub fn accepts(&self, event: &PipelineEvent) -> bool {
        event.resource == self.resource && self.event_kinds.contains(&event.kind)
    }
}
