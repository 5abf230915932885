//! Artifacts passed between pipeline actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an artifact's content lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactLocation {
    /// A git checkout at a commit.
    Git {
        /// Repository owner.
        owner: String,
        /// Repository name.
        repository: String,
        /// Commit id.
        commit: String,
    },
    /// An object in object storage.
    Object {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// Output of a managed build.
    Build {
        /// Build project name.
        project: String,
        /// Build id.
        build_id: String,
    },
}

/// An opaque, versioned output of one action consumed by another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// The artifact name other actions refer to.
    pub name: String,

    /// Where the content lives.
    pub location: ArtifactLocation,

    /// The provider's revision identifier.
    pub revision: String,

    /// Human-readable revision summary (for git, the commit message).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// SHA-256 hex digest of the content, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// When the artifact was produced (ISO 8601).
    pub created_at: String,
}

impl Artifact {
    /// Creates a new artifact.
    #[must_use]
    pub fn new(name: impl Into<String>, location: ArtifactLocation, revision: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location,
            revision: revision.into(),
            summary: None,
            digest: None,
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Sets the revision summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Records the digest of the artifact content.
    #[must_use]
    pub fn with_content(mut self, content: &[u8]) -> Self {
        self.digest = Some(crate::utils::sha256_hex(content));
        self
    }

    /// Returns a copy published under another name.
    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Addresses a file inside this artifact.
    #[must_use]
    pub fn at_path(&self, path: impl Into<String>) -> ArtifactPath {
        ArtifactPath::new(self.name.clone(), path)
    }
}

/// A file inside a named artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactPath {
    /// The artifact name.
    pub artifact: String,
    /// The path of the file within the artifact.
    pub path: String,
}

impl ArtifactPath {
    /// Creates a new artifact path.
    #[must_use]
    pub fn new(artifact: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.artifact, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_artifact() -> Artifact {
        Artifact::new(
            "s3-artifact-123456789012",
            ArtifactLocation::Object {
                bucket: "cicd-dev".to_string(),
                key: "backend_taskdef/taskdef.dev.json.zip".to_string(),
            },
            "v1",
        )
    }

    #[test]
    fn test_artifact_with_content_digest() {
        let artifact = object_artifact().with_content(b"abc");
        assert_eq!(
            artifact.digest.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_artifact_at_path() {
        let path = object_artifact().at_path("taskdef.dev.json");
        assert_eq!(path.to_string(), "s3-artifact-123456789012::taskdef.dev.json");
    }

    #[test]
    fn test_artifact_renamed_keeps_revision() {
        let renamed = object_artifact().renamed("other");
        assert_eq!(renamed.name, "other");
        assert_eq!(renamed.revision, "v1");
    }

    #[test]
    fn test_location_serialization_is_tagged() {
        let json = serde_json::to_value(&object_artifact().location).unwrap();
        assert_eq!(json["kind"], "object");
        assert_eq!(json["bucket"], "cicd-dev");
    }
}
