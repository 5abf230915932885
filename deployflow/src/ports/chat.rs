//! Chat messaging port.

use crate::errors::ServiceError;
use crate::secrets::SecretString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message to post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Channel id.
    pub channel: String,
    /// Message text.
    pub text: String,
    /// Legacy interactive attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<serde_json::Value>,
}

impl ChatMessage {
    /// Creates a plain text message.
    #[must_use]
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Adds attachments.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<serde_json::Value>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Acknowledgement of a posted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReceipt {
    /// Channel the message landed in.
    pub channel: String,
    /// Message timestamp id.
    pub ts: String,
}

/// The chat service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Posts a message as the bot identified by `token`.
    async fn post_message(&self, token: &SecretString, message: &ChatMessage) -> Result<ChatReceipt, ServiceError>;
}
