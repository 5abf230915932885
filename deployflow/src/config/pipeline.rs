//! Per-environment pipeline configuration records.
//!
//! `PipelineParams` is the raw, serializable shape. `PipelineConfig` wraps
//! it and can only be obtained through validation, so every consumer can
//! rely on the invariants checked in [`PipelineConfig::new`].

use super::Environment;
use crate::errors::ConfigError;
use crate::secrets::SecretRefs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Git source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSourceParams {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repository_name: String,
    /// Branch whose pushes deploy this environment.
    pub branch: String,
}

/// Object-storage source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSourceParams {
    /// Bucket holding the task-definition bundle (also the artifact store).
    pub bucket_name: String,
    /// Key of the zipped task definition, e.g. `backend_taskdef/taskdef.dev.json.zip`.
    pub bucket_key_backend_taskdef_file: String,
}

/// Both pipeline sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceParams {
    /// The git checkout.
    pub git: GitSourceParams,
    /// The object-storage fetch.
    pub s3: ObjectSourceParams,
}

/// Build settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildParams {
    /// Build spec file inside the git artifact.
    pub build_spec_file: String,
}

/// Deployment settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployParams {
    /// Task-definition template inside the object-storage artifact.
    pub task_definition_template_file: String,
    /// App-spec template inside the build artifact.
    pub app_spec_template_file: String,
    /// Deployment group; doubles as the display name in chat.
    pub deployment_group_name: String,
}

/// The container service being deployed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsParams {
    /// Cluster name.
    pub ecs_cluster_name: String,
    /// Service name.
    pub ecs_service_name: String,
}

/// Chat settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackParams {
    /// Chat configuration ARN lifecycle notifications are addressed to.
    pub configuration_arn: String,
    /// Channel id (starts with `C`).
    pub channel_id: String,
}

/// Tags an inbound push event must carry to start the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerParams {
    /// Event source tag.
    #[serde(default = "default_trigger_source")]
    pub source: String,
    /// Event detail-type tag.
    #[serde(default = "default_trigger_detail_type")]
    pub detail_type: String,
}

fn default_trigger_source() -> String {
    "raund.github.actions".to_string()
}

fn default_trigger_detail_type() -> String {
    "backend".to_string()
}

impl Default for TriggerParams {
    fn default() -> Self {
        Self {
            source: default_trigger_source(),
            detail_type: default_trigger_detail_type(),
        }
    }
}

/// Raw pipeline parameters, as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineParams {
    /// Environment tag.
    pub environment: Environment,
    /// Optional name prefix for derived resource names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Sources.
    pub source: SourceParams,
    /// Secret store references.
    pub secret_manager: SecretRefs,
    /// Build settings.
    pub code_build: BuildParams,
    /// Deployment settings.
    pub code_deploy: DeployParams,
    /// Target service.
    pub ecs: EcsParams,
    /// Value passed to the build as `BUILD_TARGET`.
    pub build_target: Environment,
    /// Chat settings.
    pub slack: SlackParams,
    /// Trigger tags.
    #[serde(default)]
    pub trigger: TriggerParams,
}

/// Validated pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PipelineParams", into = "PipelineParams")]
pub struct PipelineConfig {
    params: PipelineParams,
}

impl TryFrom<PipelineParams> for PipelineConfig {
    type Error = ConfigError;

    fn try_from(params: PipelineParams) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

impl From<PipelineConfig> for PipelineParams {
    fn from(config: PipelineConfig) -> Self {
        config.params
    }
}

fn channel_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^C[A-Z0-9]+$").expect("channel id pattern is valid"))
}

fn chatbot_arn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^arn:aws:chatbot::\d{12}:chat-configuration/slack-channel/[A-Za-z0-9_-]+$")
            .expect("chatbot arn pattern is valid")
    })
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(
            field,
            "must not be empty",
            "CONFIG-EMPTY",
            "Fill in the field in the environment's configuration.",
        ));
    }
    Ok(())
}

impl PipelineConfig {
    /// Validates raw parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first field that breaks
    /// an invariant.
    pub fn new(params: PipelineParams) -> Result<Self, ConfigError> {
        validate(&params)?;
        Ok(Self { params })
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let params: PipelineParams =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::new(params)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loaded pipeline configuration");
        Self::from_json_str(&contents)
    }

    /// The development preset: `develop` branch, unprefixed names.
    #[must_use]
    pub fn dev_preset() -> Self {
        Self {
            params: PipelineParams {
                environment: Environment::Dev,
                prefix: None,
                source: SourceParams {
                    git: GitSourceParams {
                        owner: "example-org".to_string(),
                        repository_name: "backend".to_string(),
                        branch: "develop".to_string(),
                    },
                    s3: ObjectSourceParams {
                        bucket_name: "example-cicd-dev".to_string(),
                        bucket_key_backend_taskdef_file: "backend_taskdef/taskdef.dev.json.zip".to_string(),
                    },
                },
                secret_manager: SecretRefs::default(),
                code_build: BuildParams {
                    build_spec_file: "buildspec.backend.yaml".to_string(),
                },
                code_deploy: DeployParams {
                    task_definition_template_file: "taskdef.dev.json".to_string(),
                    app_spec_template_file: "appspec.yaml".to_string(),
                    deployment_group_name: "dev".to_string(),
                },
                ecs: EcsParams {
                    ecs_cluster_name: "backend-cluster-dev".to_string(),
                    ecs_service_name: "Service-dev".to_string(),
                },
                build_target: Environment::Dev,
                slack: SlackParams {
                    configuration_arn:
                        "arn:aws:chatbot::123456789012:chat-configuration/slack-channel/deploy-dev".to_string(),
                    channel_id: "C0123456789".to_string(),
                },
                trigger: TriggerParams::default(),
            },
        }
    }

    /// Returns the raw parameters.
    #[must_use]
    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Returns the environment tag.
    #[must_use]
    pub fn environment(&self) -> Environment {
        self.params.environment
    }

    fn prefixed(&self, name: &str) -> String {
        match &self.params.prefix {
            Some(prefix) => format!("{prefix}-{name}"),
            None => name.to_string(),
        }
    }

    /// `[{prefix}-]backend-{env}`.
    #[must_use]
    pub fn pipeline_name(&self) -> String {
        self.prefixed(&format!("backend-{}", self.params.environment))
    }

    /// `docker-build-project-{env}`.
    #[must_use]
    pub fn build_project_name(&self) -> String {
        format!("docker-build-project-{}", self.params.environment)
    }

    /// `[{prefix}-]app-{env}`; shown in chat, so it names the environment.
    #[must_use]
    pub fn deploy_application_name(&self) -> String {
        self.prefixed(&format!("app-{}", self.params.environment))
    }

    /// Topic the approval notifier is subscribed to.
    #[must_use]
    pub fn approval_topic_name(&self) -> String {
        self.prefixed(&format!("backend-pipeline-approval-topic-{}", self.params.environment))
    }

    /// Notification rule for pipeline lifecycle events.
    #[must_use]
    pub fn pipeline_notification_rule_name(&self) -> String {
        self.prefixed(&format!("backend-pipeline-notification-{}", self.params.environment))
    }

    /// Notification rule for build lifecycle events.
    #[must_use]
    pub fn build_notification_rule_name(&self) -> String {
        self.prefixed(&format!("backend-build-notification-{}", self.params.environment))
    }

    /// Name of the trigger rule.
    #[must_use]
    pub fn trigger_rule_name(&self) -> String {
        format!("backend-pipeline-trigger-event-{}", self.params.environment)
    }
}

fn validate(params: &PipelineParams) -> Result<(), ConfigError> {
    let env = params.environment;

    if let Some(prefix) = &params.prefix {
        require_non_empty("prefix", prefix)?;
        if prefix.ends_with('-') {
            return Err(ConfigError::invalid(
                "prefix",
                "must not end with '-'",
                "CONFIG-PREFIX",
                "Drop the trailing dash; names are joined with '-' already.",
            ));
        }
    }

    require_non_empty("source.git.owner", &params.source.git.owner)?;
    require_non_empty("source.git.repositoryName", &params.source.git.repository_name)?;
    require_non_empty("source.s3.bucketName", &params.source.s3.bucket_name)?;
    require_non_empty("codeBuild.buildSpecFile", &params.code_build.build_spec_file)?;
    require_non_empty("codeDeploy.appSpecTemplateFile", &params.code_deploy.app_spec_template_file)?;
    params.secret_manager.validate()?;

    if !env.accepts_branch(&params.source.git.branch) {
        return Err(ConfigError::invalid(
            "source.git.branch",
            format!(
                "branch '{}' cannot deploy to {env} (expected {})",
                params.source.git.branch,
                env.designated_branches()
            ),
            "CONFIG-BRANCH",
            format!("Use {} for the {env} pipeline.", env.designated_branches()),
        ));
    }

    let expected_taskdef = format!("taskdef.{env}.json");
    if params.code_deploy.task_definition_template_file != expected_taskdef {
        return Err(ConfigError::invalid(
            "codeDeploy.taskDefinitionTemplateFile",
            format!(
                "'{}' does not encode the environment",
                params.code_deploy.task_definition_template_file
            ),
            "CONFIG-TASKDEF",
            format!("Use '{expected_taskdef}'."),
        ));
    }

    let expected_key_suffix = format!("taskdef.{env}.json.zip");
    if !params.source.s3.bucket_key_backend_taskdef_file.ends_with(&expected_key_suffix) {
        return Err(ConfigError::invalid(
            "source.s3.bucketKeyBackendTaskdefFile",
            format!(
                "'{}' does not end with '{expected_key_suffix}'",
                params.source.s3.bucket_key_backend_taskdef_file
            ),
            "CONFIG-TASKDEF-KEY",
            format!("Upload the bundle as '.../{expected_key_suffix}'."),
        ));
    }

    if params.code_deploy.deployment_group_name != env.as_str() {
        return Err(ConfigError::invalid(
            "codeDeploy.deploymentGroupName",
            format!("'{}' must equal '{env}'", params.code_deploy.deployment_group_name),
            "CONFIG-DEPLOYMENT-GROUP",
            "The deployment group is shown in chat and must name the environment.",
        ));
    }

    let env_suffix = format!("-{env}");
    for (field, value) in [
        ("ecs.ecsClusterName", &params.ecs.ecs_cluster_name),
        ("ecs.ecsServiceName", &params.ecs.ecs_service_name),
    ] {
        if !value.ends_with(&env_suffix) {
            return Err(ConfigError::invalid(
                field,
                format!("'{value}' does not end with '{env_suffix}'"),
                "CONFIG-ECS",
                format!("Name the {env} service resources with the '{env_suffix}' suffix."),
            ));
        }
    }

    if !channel_id_pattern().is_match(&params.slack.channel_id) {
        return Err(ConfigError::invalid(
            "slack.channelId",
            format!("'{}' is not a channel id", params.slack.channel_id),
            "CONFIG-CHANNEL",
            "Channel ids start with 'C' followed by upper-case letters and digits.",
        ));
    }

    let arn = &params.slack.configuration_arn;
    if !chatbot_arn_pattern().is_match(arn) || !arn.ends_with(&env_suffix) {
        return Err(ConfigError::invalid(
            "slack.configurationArn",
            format!("'{arn}' is not a chat configuration ARN for {env}"),
            "CONFIG-CHATBOT-ARN",
            format!("Expected arn:aws:chatbot::<account>:chat-configuration/slack-channel/<name>{env_suffix}."),
        ));
    }

    require_non_empty("trigger.source", &params.trigger.source)?;
    require_non_empty("trigger.detailType", &params.trigger.detail_type)?;

    Ok(())
}
