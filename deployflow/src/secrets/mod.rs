//! Credential resolution.
//!
//! Secrets are stored as JSON objects; a credential is addressed by the
//! secret id plus a field name inside the object. Resolved values are
//! wrapped in [`SecretString`], which redacts itself in `Debug` and
//! `Display` so it cannot end up in logs by accident.

use crate::errors::{ConfigError, SecretError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// An opaque credential value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Wraps a value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Exposes the value to the code that must send it somewhere.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Where the two pipeline credentials live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRefs {
    /// Secret holding the source-control token.
    #[serde(rename = "gitTokenARN")]
    pub git_token_arn: String,
    /// Field of the source-control token.
    pub git_token_json_field: String,
    /// Secret holding the chat-bot token.
    pub slack_token_arn: String,
    /// Field of the chat-bot token.
    pub slack_token_json_field: String,
}

impl Default for SecretRefs {
    fn default() -> Self {
        Self {
            git_token_arn: "GitHub".to_string(),
            git_token_json_field: "GitHubToken".to_string(),
            slack_token_arn: "Slack".to_string(),
            slack_token_json_field: "BotUserOAuthToken".to_string(),
        }
    }
}

impl SecretRefs {
    /// Checks that every reference is filled in.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("secretManager.gitTokenARN", &self.git_token_arn),
            ("secretManager.gitTokenJsonField", &self.git_token_json_field),
            ("secretManager.slackTokenArn", &self.slack_token_arn),
            ("secretManager.slackTokenJsonField", &self.slack_token_json_field),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(
                    field,
                    "must not be empty",
                    "CONFIG-EMPTY",
                    "Name the secret and the JSON field holding the credential.",
                ));
            }
        }
        Ok(())
    }
}

/// Port onto the secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the raw secret string for `secret_id`.
    async fn get_secret_string(&self, secret_id: &str) -> Result<SecretString, SecretError>;
}

/// The resolved pipeline credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Source-control access token.
    pub git_token: SecretString,
    /// Chat-bot API token.
    pub chat_token: SecretString,
}

/// Fetches credentials by `(secret id, json field)`.
pub struct SecretResolver<'a> {
    store: &'a dyn SecretStore,
}

impl<'a> SecretResolver<'a> {
    /// Creates a resolver over a store.
    #[must_use]
    pub fn new(store: &'a dyn SecretStore) -> Self {
        Self { store }
    }

    /// Resolves a single field of a JSON secret.
    #[instrument(skip(self))]
    pub async fn field(&self, secret_id: &str, field: &str) -> Result<SecretString, SecretError> {
        let raw = self.store.get_secret_string(secret_id).await?;
        let document: serde_json::Value =
            serde_json::from_str(raw.expose()).map_err(|_| SecretError::NotJson {
                secret_id: secret_id.to_string(),
            })?;
        let object = document.as_object().ok_or_else(|| SecretError::NotJson {
            secret_id: secret_id.to_string(),
        })?;

        let value = object
            .get(field)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| SecretError::MissingField {
                secret_id: secret_id.to_string(),
                field: field.to_string(),
            })?;

        debug!(secret_id, field, "Resolved secret field");
        Ok(SecretString::new(value))
    }

    /// Resolves both pipeline credentials.
    ///
    /// Any failure is fatal: no stage may run without its credentials.
    pub async fn resolve(&self, refs: &SecretRefs) -> Result<Credentials, SecretError> {
        let git_token = self.field(&refs.git_token_arn, &refs.git_token_json_field).await?;
        let chat_token = self.field(&refs.slack_token_arn, &refs.slack_token_json_field).await?;
        Ok(Credentials { git_token, chat_token })
    }
}

/// A secret store held in memory.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: DashMap<String, SecretString>,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a JSON object under `secret_id`.
    pub fn put_json(&self, secret_id: impl Into<String>, value: &serde_json::Value) {
        self.secrets
            .insert(secret_id.into(), SecretString::new(value.to_string()));
    }

    /// Stores a raw secret string.
    pub fn put_raw(&self, secret_id: impl Into<String>, value: impl Into<String>) {
        self.secrets.insert(secret_id.into(), SecretString::new(value));
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get_secret_string(&self, secret_id: &str) -> Result<SecretString, SecretError> {
        self.secrets
            .get(secret_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SecretError::NotFound {
                secret_id: secret_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> InMemorySecretStore {
        let store = InMemorySecretStore::new();
        store.put_json("GitHub", &serde_json::json!({"GitHubToken": "ghp_secret"}));
        store.put_json("Slack", &serde_json::json!({"BotUserOAuthToken": "xoxb-secret"}));
        store
    }

    #[test]
    fn test_secret_string_is_redacted() {
        let secret = SecretString::new("hunter2");
        assert_eq!(format!("{secret:?}"), "SecretString(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[tokio::test]
    async fn test_resolve_both_credentials() {
        let store = seeded_store();
        let creds = SecretResolver::new(&store)
            .resolve(&SecretRefs::default())
            .await
            .unwrap();

        assert_eq!(creds.git_token.expose(), "ghp_secret");
        assert_eq!(creds.chat_token.expose(), "xoxb-secret");
        assert!(!format!("{creds:?}").contains("secret\""));
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let store = InMemorySecretStore::new();
        let err = SecretResolver::new(&store)
            .resolve(&SecretRefs::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SecretError::NotFound {
                secret_id: "GitHub".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_field() {
        let store = seeded_store();
        let err = SecretResolver::new(&store)
            .field("Slack", "SigningSecret")
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::MissingField { .. }));
    }

    #[test]
    fn test_non_json_secret() {
        let store = InMemorySecretStore::new();
        store.put_raw("GitHub", "plain-token");
        let err = tokio_test::block_on(SecretResolver::new(&store).field("GitHub", "GitHubToken"))
            .unwrap_err();
        assert_eq!(
            err,
            SecretError::NotJson {
                secret_id: "GitHub".to_string()
            }
        );
    }

    #[test]
    fn test_refs_validation() {
        assert!(SecretRefs::default().validate().is_ok());
        let refs = SecretRefs {
            slack_token_json_field: String::new(),
            ..SecretRefs::default()
        };
        assert_eq!(refs.validate().unwrap_err().code(), Some("CONFIG-EMPTY"));
    }
}
