//! Build, deployment and autoscaling ports.

use crate::core::{Artifact, ArtifactPath};
use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A request to run a build project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Build project name.
    pub project_name: String,
    /// Build spec file inside the source.
    pub build_spec: String,
    /// Plaintext environment variables.
    pub environment_variables: BTreeMap<String, String>,
    /// The source to build.
    pub source: Artifact,
}

/// A finished, successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Build id.
    pub build_id: String,
    /// Revision of the produced output.
    pub output_revision: String,
}

/// The managed build service.
#[async_trait]
pub trait BuildInvoker: Send + Sync {
    /// Runs a build to completion; an error means the build failed.
    async fn run_build(&self, request: &BuildRequest) -> Result<BuildReport, ServiceError>;
}

/// How traffic moves to the new task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentConfig {
    /// Shift all traffic at once.
    AllAtOnce,
}

impl fmt::Display for DeploymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllAtOnce => f.write_str("ECSAllAtOnce"),
        }
    }
}

/// A container service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EcsTarget {
    /// Cluster name.
    pub cluster: String,
    /// Service name.
    pub service: String,
}

impl fmt::Display for EcsTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster, self.service)
    }
}

/// A request to deploy a task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Deploy application name.
    pub application: String,
    /// Deployment group name.
    pub deployment_group: String,
    /// Traffic shift strategy.
    pub deployment_config: DeploymentConfig,
    /// Task definition template.
    pub task_definition: ArtifactPath,
    /// App spec template.
    pub app_spec: ArtifactPath,
    /// The service being updated.
    pub target: EcsTarget,
}

/// A finished, successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    /// Deployment id.
    pub deployment_id: String,
}

/// The managed deployment service.
#[async_trait]
pub trait DeployInvoker: Send + Sync {
    /// Runs a deployment to completion; an error means it failed.
    async fn deploy(&self, request: &DeployRequest) -> Result<DeploymentReport, ServiceError>;
}

/// Application autoscaling for a container service.
#[async_trait]
pub trait AutoscalingControl: Send + Sync {
    /// Suspends scale-in and scale-out.
    async fn suspend(&self, target: &EcsTarget) -> Result<(), ServiceError>;

    /// Resumes scaling.
    async fn resume(&self, target: &EcsTarget) -> Result<(), ServiceError>;
}
