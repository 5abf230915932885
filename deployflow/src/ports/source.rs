//! Source providers: the git host and object storage.

use crate::errors::ServiceError;
use crate::secrets::SecretString;
use crate::utils::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What to check out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCheckout {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repository: String,
    /// Branch to take the head of.
    pub branch: String,
}

/// The commit a checkout resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRevision {
    /// Commit id.
    pub commit: String,
    /// Commit message.
    pub message: String,
    /// Commit time.
    pub committed_at: Timestamp,
}

/// The source-control host.
#[async_trait]
pub trait GitSourceProvider: Send + Sync {
    /// Resolves the head of a branch.
    async fn checkout(&self, request: &GitCheckout, token: &SecretString) -> Result<GitRevision, ServiceError>;
}

/// An object read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object version id.
    pub version_id: String,
    /// Object bytes.
    pub content: Vec<u8>,
}

/// Object storage.
#[async_trait]
pub trait ObjectSourceProvider: Send + Sync {
    /// Reads the latest version of an object.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, ServiceError>;
}
