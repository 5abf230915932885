//! Error types for the deployflow crate.
//!
//! The taxonomy mirrors how a deployment run can end badly: configuration
//! that fails validation, credentials that cannot be fetched, a managed
//! service that refuses a request, or a pipeline definition that does not
//! hold together. Notification delivery has its own error type because it
//! never flows back into pipeline state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for deployflow operations.
#[derive(Debug, Error)]
pub enum DeployflowError {
    /// Configuration failed to load or validate.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A credential could not be resolved.
    #[error("{0}")]
    Secret(#[from] SecretError),

    /// A managed service call failed.
    #[error("{0}")]
    Service(#[from] ServiceError),

    /// The pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// An approval could not be resolved.
    #[error("{0}")]
    Approval(#[from] ApprovalError),

    /// A stage failed and ended the execution.
    #[error("Stage '{stage}' failed: {reason}")]
    StageFailed {
        /// The stage name.
        stage: String,
        /// The failure reason.
        reason: String,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for DeployflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Metadata about a validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONFIG-BRANCH").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value that violates a configuration invariant.
    #[error("Invalid configuration field '{field}': {message}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
        /// Diagnostic code and fix hint.
        error_info: ContractErrorInfo,
    },

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Creates an invalid-field error.
    #[must_use]
    pub fn invalid(
        field: impl Into<String>,
        message: impl Into<String>,
        code: &str,
        fix_hint: impl Into<String>,
    ) -> Self {
        let field = field.into();
        let message = message.into();
        let error_info = ContractErrorInfo::new(code, message.clone())
            .with_fix_hint(fix_hint)
            .with_context_entry("field", field.clone());
        Self::Invalid {
            field,
            message,
            error_info,
        }
    }

    /// Returns the diagnostic code, if this is a validation error.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Invalid { error_info, .. } => Some(&error_info.code),
            _ => None,
        }
    }
}

/// Errors raised while resolving credentials.
///
/// None of the variants carry the secret value itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretError {
    /// The secret does not exist in the store.
    #[error("Secret not found: {secret_id}")]
    NotFound {
        /// The secret identifier.
        secret_id: String,
    },

    /// The secret store could not be reached.
    #[error("Secret store unavailable while reading '{secret_id}': {reason}")]
    Unavailable {
        /// The secret identifier.
        secret_id: String,
        /// The reason reported by the store.
        reason: String,
    },

    /// The secret value is not a JSON object.
    #[error("Secret '{secret_id}' is not a JSON object")]
    NotJson {
        /// The secret identifier.
        secret_id: String,
    },

    /// The secret has no such field, or it is not a string.
    #[error("Secret '{secret_id}' has no string field '{field}'")]
    MissingField {
        /// The secret identifier.
        secret_id: String,
        /// The requested JSON field.
        field: String,
    },
}

/// Errors returned by managed-service ports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The service could not be reached.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        /// The service name.
        service: String,
        /// The reason.
        reason: String,
    },

    /// The addressed resource does not exist.
    #[error("{service}: resource not found: {resource}")]
    NotFound {
        /// The service name.
        service: String,
        /// The resource identifier.
        resource: String,
    },

    /// The service refused the request.
    #[error("{service} rejected the request: {reason}")]
    Rejected {
        /// The service name.
        service: String,
        /// The reason.
        reason: String,
    },

    /// The requested operation ran and failed.
    #[error("{service} operation failed: {reason}")]
    Failed {
        /// The service name.
        service: String,
        /// The reason.
        reason: String,
    },
}

impl ServiceError {
    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(service: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::NotFound {
            service: service.into(),
            resource: resource.into(),
        }
    }

    /// Creates a rejected error.
    #[must_use]
    pub fn rejected(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Creates a failed error.
    #[must_use]
    pub fn failed(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            service: service.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a pipeline definition does not hold together.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the diagnostic code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Errors related to manual approvals.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApprovalError {
    /// No pending approval carries this token.
    #[error("No pending approval for token {token}")]
    UnknownToken {
        /// The approval token.
        token: String,
    },

    /// The approval exists but belongs to another pipeline.
    #[error("Approval token {token} belongs to pipeline '{expected}', not '{actual}'")]
    PipelineMismatch {
        /// The approval token.
        token: String,
        /// The pipeline that requested the approval.
        expected: String,
        /// The pipeline named in the reply.
        actual: String,
    },

    /// The approval already left the pending state.
    #[error("Approval already resolved as {state}")]
    AlreadyResolved {
        /// The state it resolved to.
        state: String,
    },

    /// A chat reply could not be interpreted.
    #[error("Malformed approval reply: {0}")]
    MalformedReply(String),
}

/// Errors raised by notification subscribers.
///
/// These are logged by the bus and never change an execution's outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    /// The chat service did not accept the message.
    #[error("Chat delivery to '{channel}' failed: {reason}")]
    Delivery {
        /// The target channel.
        channel: String,
        /// The reason.
        reason: String,
    },

    /// The pipeline state needed to build the message was unavailable.
    #[error("Could not read pipeline state for '{pipeline}': {reason}")]
    State {
        /// The pipeline name.
        pipeline: String,
        /// The reason.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("CONFIG-BRANCH", "Branch mismatch")
            .with_fix_hint("Use develop")
            .with_context_entry("field", "source.git.branch");

        assert_eq!(info.code, "CONFIG-BRANCH");
        assert_eq!(info.fix_hint, Some("Use develop".to_string()));
        assert_eq!(info.context.get("field"), Some(&"source.git.branch".to_string()));
    }

    #[test]
    fn test_config_error_code() {
        let err = ConfigError::invalid("slack.channelId", "must start with C", "CONFIG-CHANNEL", "fix it");
        assert_eq!(err.code(), Some("CONFIG-CHANNEL"));
        assert!(err.to_string().contains("slack.channelId"));

        let parse = ConfigError::Parse("bad".to_string());
        assert_eq!(parse.code(), None);
    }

    #[test]
    fn test_secret_error_does_not_leak_value() {
        let err = SecretError::MissingField {
            secret_id: "GitHub".to_string(),
            field: "GitHubToken".to_string(),
        };
        assert_eq!(err.to_string(), "Secret 'GitHub' has no string field 'GitHubToken'");
    }

    #[test]
    fn test_service_error_converts() {
        let err: DeployflowError = ServiceError::unavailable("codepipeline", "throttled").into();
        assert!(matches!(err, DeployflowError::Service(_)));
        assert_eq!(err.to_string(), "codepipeline unavailable: throttled");
    }

    #[test]
    fn test_validation_error_code() {
        let err = PipelineValidationError::new("empty")
            .with_error_info(ContractErrorInfo::new("PIPELINE-EMPTY", "empty"));
        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));
    }
}
