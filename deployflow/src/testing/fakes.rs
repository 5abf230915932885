//! In-memory fakes for the managed-service ports.
//!
//! Every fake appends a line to a shared [`Journal`] when called and can be
//! told to fail its next calls with [`fail_with`](FakeBuild::fail_with).

use async_trait::async_trait;
use chrono::TimeZone;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::{seeded_secret_store, Journal, TASKDEF_BUNDLE};
use crate::errors::ServiceError;
use crate::pipeline::InMemoryOrchestrator;
use crate::ports::{
    AutoscalingControl, BuildInvoker, BuildReport, BuildRequest, ChatClient, ChatMessage, ChatReceipt,
    DeployInvoker, DeployRequest, DeploymentReport, EcsTarget, ExecutionSummary, GitCheckout, GitRevision,
    GitSourceProvider, ObjectSourceProvider, OrchestrationService, PipelineState, Ports, StoredObject,
};
use crate::secrets::SecretString;

/// A failure switch shared by the fakes.
#[derive(Debug, Default)]
struct FailSwitch(Mutex<Option<String>>);

impl FailSwitch {
    fn set(&self, reason: impl Into<String>) {
        *self.0.lock() = Some(reason.into());
    }

    fn check(&self, service: &str) -> Result<(), ServiceError> {
        match self.0.lock().as_ref() {
            Some(reason) => Err(ServiceError::failed(service, reason.clone())),
            None => Ok(()),
        }
    }
}

/// Source-control host that always resolves to the same commit.
#[derive(Debug)]
pub struct FakeGit {
    journal: Journal,
    fail: FailSwitch,
}

impl FakeGit {
    /// Commit id every checkout resolves to.
    pub const COMMIT: &'static str = "3f2a9c1e8b7d";
    /// Message of that commit.
    pub const MESSAGE: &'static str = "Add health check";

    /// Makes subsequent checkouts fail.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.fail.set(reason);
    }
}

#[async_trait]
impl GitSourceProvider for FakeGit {
    async fn checkout(&self, request: &GitCheckout, _token: &SecretString) -> Result<GitRevision, ServiceError> {
        self.journal.record(format!("git.checkout {}", request.branch));
        self.fail.check("github")?;
        Ok(GitRevision {
            commit: Self::COMMIT.to_string(),
            message: Self::MESSAGE.to_string(),
            committed_at: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 3, 30, 0).single().unwrap_or_default(),
        })
    }
}

/// Object storage holding [`TASKDEF_BUNDLE`] under every key.
#[derive(Debug)]
pub struct FakeObjects {
    journal: Journal,
    fail: FailSwitch,
}

impl FakeObjects {
    /// Makes subsequent fetches fail.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.fail.set(reason);
    }
}

#[async_trait]
impl ObjectSourceProvider for FakeObjects {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, ServiceError> {
        self.journal.record(format!("objects.fetch {bucket}/{key}"));
        self.fail.check("s3")?;
        Ok(StoredObject {
            version_id: "v1".to_string(),
            content: TASKDEF_BUNDLE.to_vec(),
        })
    }
}

/// Build service that records requests.
#[derive(Debug)]
pub struct FakeBuild {
    journal: Journal,
    fail: FailSwitch,
    requests: Mutex<Vec<BuildRequest>>,
}

impl FakeBuild {
    /// Makes subsequent builds fail.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.fail.set(reason);
    }

    /// Returns every request received.
    #[must_use]
    pub fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl BuildInvoker for FakeBuild {
    async fn run_build(&self, request: &BuildRequest) -> Result<BuildReport, ServiceError> {
        self.journal.record(format!("build.run {}", request.project_name));
        let number = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };
        self.fail.check("codebuild")?;
        Ok(BuildReport {
            build_id: format!("{}:{number}", request.project_name),
            output_revision: format!("{}-{number}", request.source.revision),
        })
    }
}

/// Deployment service that records requests.
#[derive(Debug)]
pub struct FakeDeploy {
    journal: Journal,
    fail: FailSwitch,
    requests: Mutex<Vec<DeployRequest>>,
}

impl FakeDeploy {
    /// Makes subsequent deployments fail.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.fail.set(reason);
    }

    /// Returns every request received.
    #[must_use]
    pub fn requests(&self) -> Vec<DeployRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DeployInvoker for FakeDeploy {
    async fn deploy(&self, request: &DeployRequest) -> Result<DeploymentReport, ServiceError> {
        self.journal.record(format!("deploy.create {}", request.target));
        let number = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };
        self.fail.check("codedeploy")?;
        Ok(DeploymentReport {
            deployment_id: format!("d-{number:08}"),
        })
    }
}

/// Autoscaling control that tracks which services are suspended.
#[derive(Debug)]
pub struct FakeAutoscaling {
    journal: Journal,
    fail: FailSwitch,
    suspended: Mutex<HashSet<EcsTarget>>,
}

impl FakeAutoscaling {
    /// Makes subsequent calls fail.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.fail.set(reason);
    }

    /// Returns whether scaling is suspended for `target`.
    #[must_use]
    pub fn is_suspended(&self, target: &EcsTarget) -> bool {
        self.suspended.lock().contains(target)
    }
}

#[async_trait]
impl AutoscalingControl for FakeAutoscaling {
    async fn suspend(&self, target: &EcsTarget) -> Result<(), ServiceError> {
        self.journal.record(format!("autoscaling.suspend {target}"));
        self.fail.check("application-autoscaling")?;
        self.suspended.lock().insert(target.clone());
        Ok(())
    }

    async fn resume(&self, target: &EcsTarget) -> Result<(), ServiceError> {
        self.journal.record(format!("autoscaling.resume {target}"));
        self.fail.check("application-autoscaling")?;
        self.suspended.lock().remove(target);
        Ok(())
    }
}

/// Chat service that keeps every posted message.
#[derive(Debug)]
pub struct FakeChat {
    journal: Journal,
    fail: FailSwitch,
    messages: Mutex<Vec<ChatMessage>>,
}

impl FakeChat {
    /// Makes subsequent posts fail.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.fail.set(reason);
    }

    /// Returns every message posted.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn post_message(&self, _token: &SecretString, message: &ChatMessage) -> Result<ChatReceipt, ServiceError> {
        self.journal.record(format!("chat.post {}", message.channel));
        self.fail.check("slack")?;
        let ts = {
            let mut messages = self.messages.lock();
            messages.push(message.clone());
            format!("1700000000.{:06}", messages.len())
        };
        Ok(ChatReceipt {
            channel: message.channel.clone(),
            ts,
        })
    }
}

/// An orchestration service that cannot be reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableOrchestration;

#[async_trait]
impl OrchestrationService for UnavailableOrchestration {
    async fn list_in_progress(&self, _pipeline_name: &str) -> Result<Vec<ExecutionSummary>, ServiceError> {
        Err(ServiceError::unavailable("codepipeline", "connection refused"))
    }

    async fn stop_execution(&self, _pipeline_name: &str, _execution_id: Uuid, _reason: &str) -> Result<(), ServiceError> {
        Err(ServiceError::unavailable("codepipeline", "connection refused"))
    }

    async fn pipeline_state(&self, _pipeline_name: &str) -> Result<PipelineState, ServiceError> {
        Err(ServiceError::unavailable("codepipeline", "connection refused"))
    }
}

/// One fake per service, all writing to the same journal.
#[derive(Debug, Clone)]
pub struct Fakes {
    /// Source-control host.
    pub git: Arc<FakeGit>,
    /// Object storage.
    pub objects: Arc<FakeObjects>,
    /// Build service.
    pub build: Arc<FakeBuild>,
    /// Deployment service.
    pub deploy: Arc<FakeDeploy>,
    /// Autoscaling control.
    pub autoscaling: Arc<FakeAutoscaling>,
    /// Chat service.
    pub chat: Arc<FakeChat>,
}

impl Fakes {
    /// Creates fakes that record into `journal`.
    #[must_use]
    pub fn new(journal: &Journal) -> Self {
        Self {
            git: Arc::new(FakeGit {
                journal: journal.clone(),
                fail: FailSwitch::default(),
            }),
            objects: Arc::new(FakeObjects {
                journal: journal.clone(),
                fail: FailSwitch::default(),
            }),
            build: Arc::new(FakeBuild {
                journal: journal.clone(),
                fail: FailSwitch::default(),
                requests: Mutex::new(Vec::new()),
            }),
            deploy: Arc::new(FakeDeploy {
                journal: journal.clone(),
                fail: FailSwitch::default(),
                requests: Mutex::new(Vec::new()),
            }),
            autoscaling: Arc::new(FakeAutoscaling {
                journal: journal.clone(),
                fail: FailSwitch::default(),
                suspended: Mutex::new(HashSet::new()),
            }),
            chat: Arc::new(FakeChat {
                journal: journal.clone(),
                fail: FailSwitch::default(),
                messages: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Bundles the fakes into [`Ports`], using `registry` for orchestration
    /// and a store seeded with both credentials.
    #[must_use]
    pub fn ports(&self, registry: Arc<InMemoryOrchestrator>) -> Ports {
        Ports {
            secrets: Arc::new(seeded_secret_store()),
            orchestration: registry,
            git: self.git.clone(),
            objects: self.objects.clone(),
            build: self.build.clone(),
            deploy: self.deploy.clone(),
            autoscaling: self.autoscaling.clone(),
            chat: self.chat.clone(),
        }
    }
}
