//! Slack Web API chat client.

use crate::errors::ServiceError;
use crate::ports::{ChatClient, ChatMessage, ChatReceipt};
use crate::secrets::SecretString;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Default Slack Web API base URL.
pub const SLACK_API_BASE_URL: &str = "https://slack.com/api";

const SERVICE: &str = "slack";

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Posts messages through `chat.postMessage`.
#[derive(Debug, Clone)]
pub struct SlackChatClient {
    base_url: String,
    client: Client,
}

impl Default for SlackChatClient {
    fn default() -> Self {
        Self::new(SLACK_API_BASE_URL)
    }
}

impl SlackChatClient {
    /// Creates a client for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Creates a client with a configured HTTP client.
    #[must_use]
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatClient for SlackChatClient {
    async fn post_message(&self, token: &SecretString, message: &ChatMessage) -> Result<ChatReceipt, ServiceError> {
        let url = format!("{}/chat.postMessage", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose())
            .json(message)
            .send()
            .await
            .map_err(|e| ServiceError::unavailable(SERVICE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::failed(SERVICE, format!("HTTP {status}")));
        }

        let body: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::failed(SERVICE, format!("unreadable response: {e}")))?;
        if !body.ok {
            return Err(ServiceError::rejected(
                SERVICE,
                body.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        debug!(channel = %message.channel, "Slack message posted");
        Ok(ChatReceipt {
            channel: body.channel.unwrap_or_else(|| message.channel.clone()),
            ts: body.ts.unwrap_or_default(),
        })
    }
}
