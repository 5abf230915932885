//! Configuration: environments, validated pipeline records, runtime settings.

mod environment;
mod pipeline;
mod settings;

pub use environment::Environment;
pub use pipeline::{
    BuildParams, DeployParams, EcsParams, GitSourceParams, ObjectSourceParams, PipelineConfig,
    PipelineParams, SlackParams, SourceParams, TriggerParams,
};
pub use settings::{RunnerSettings, DEFAULT_NOTIFY_UTC_OFFSET_HOURS};
