//! Pipeline builder with validation.

use super::{PipelineDefinition, StageSpec};
use crate::core::ActionCategory;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use std::collections::HashSet;

/// Builder for creating validated pipeline definitions.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage. Stages run in the order they are added.
    #[must_use]
    pub fn stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the stages and builds the definition.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found: an empty name or
    /// pipeline, duplicate stage or action names, an empty stage, source
    /// actions outside the first stage, a zero run order, a duplicate
    /// output artifact, or an input artifact nothing produces earlier.
    pub fn build(self) -> Result<PipelineDefinition, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Pipeline name cannot be empty").with_error_info(
                ContractErrorInfo::new("PIPELINE-NAME", "Pipeline name is empty")
                    .with_fix_hint("Derive the name from the pipeline configuration."),
            ));
        }

        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages").with_error_info(
                ContractErrorInfo::new("PIPELINE-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one stage to the pipeline before building."),
            ));
        }

        let mut stage_names = HashSet::new();
        let mut produced: HashSet<String> = HashSet::new();

        for (index, stage) in self.stages.iter().enumerate() {
            if !stage_names.insert(stage.name.as_str()) {
                return Err(stage_error(
                    stage,
                    format!("Duplicate stage name '{}'", stage.name),
                    "PIPELINE-DUPLICATE-STAGE",
                    "Stage names must be unique within a pipeline.",
                ));
            }

            if stage.actions.is_empty() {
                return Err(stage_error(
                    stage,
                    format!("Stage '{}' has no actions", stage.name),
                    "PIPELINE-EMPTY-STAGE",
                    "Every stage needs at least one action.",
                ));
            }

            validate_stage(index, stage, &mut produced)?;
        }

        Ok(PipelineDefinition::new(self.name, self.stages))
    }
}

fn stage_error(stage: &StageSpec, message: String, code: &str, hint: &str) -> PipelineValidationError {
    PipelineValidationError::new(message.clone())
        .with_stages(vec![stage.name.clone()])
        .with_error_info(
            ContractErrorInfo::new(code, message)
                .with_fix_hint(hint)
                .with_context_entry("stage", stage.name.clone()),
        )
}

fn validate_stage(
    index: usize,
    stage: &StageSpec,
    produced: &mut HashSet<String>,
) -> Result<(), PipelineValidationError> {
    let first = index == 0;
    let mut action_names = HashSet::new();

    for spec in &stage.actions {
        if !action_names.insert(spec.name()) {
            return Err(stage_error(
                stage,
                format!("Duplicate action '{}' in stage '{}'", spec.name(), stage.name),
                "PIPELINE-DUPLICATE-ACTION",
                "Action names must be unique within a stage.",
            ));
        }

        let is_source = spec.action.category() == ActionCategory::Source;
        if first != is_source {
            return Err(stage_error(
                stage,
                format!(
                    "Action '{}' is in stage '{}' but source actions belong only to the first stage",
                    spec.name(),
                    stage.name
                ),
                "PIPELINE-SOURCE-FIRST",
                "Put every source action, and only source actions, in the first stage.",
            ));
        }

        if spec.run_order == 0 {
            return Err(stage_error(
                stage,
                format!("Action '{}' has run order 0", spec.name()),
                "PIPELINE-RUN-ORDER",
                "Run orders start at 1.",
            ));
        }
    }

    // Inputs may come from earlier stages or lower run orders of this one.
    for (_, group) in stage.run_order_groups() {
        for spec in &group {
            for input in spec.action.input_artifacts() {
                if !produced.contains(&input) {
                    return Err(stage_error(
                        stage,
                        format!(
                            "Action '{}' reads artifact '{input}' that no earlier action produces",
                            spec.name()
                        ),
                        "PIPELINE-MISSING-ARTIFACT",
                        "Produce the artifact in an earlier stage or at a lower run order.",
                    ));
                }
            }
        }
        for spec in &group {
            for output in spec.action.output_artifacts() {
                if !produced.insert(output.clone()) {
                    return Err(stage_error(
                        stage,
                        format!("Artifact '{output}' is produced twice"),
                        "PIPELINE-DUPLICATE-ARTIFACT",
                        "Give every output artifact a unique name.",
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionCategory;
    use crate::testing::StaticAction;
    use std::sync::Arc;

    fn source_stage() -> StageSpec {
        StageSpec::new("Source").with_action(
            Arc::new(StaticAction::succeeding("GitHubSource").with_category(ActionCategory::Source).producing("git")),
            1,
        )
    }

    fn build_stage() -> StageSpec {
        StageSpec::new("Build").with_action(
            Arc::new(
                StaticAction::succeeding("CodeBuild")
                    .with_category(ActionCategory::Build)
                    .reading("git")
                    .producing("image"),
            ),
            1,
        )
    }

    #[test]
    fn test_valid_pipeline() {
        let definition = PipelineBuilder::new("backend-dev")
            .stage(source_stage())
            .stage(build_stage())
            .build()
            .unwrap();

        assert_eq!(definition.name(), "backend-dev");
        assert_eq!(definition.stage_names(), vec!["Source", "Build"]);
        assert_eq!(definition.layout()[1].action_names, vec!["CodeBuild".to_string()]);
    }

    #[test]
    fn test_empty_pipeline() {
        let err = PipelineBuilder::new("backend-dev").build().unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));

        let err = PipelineBuilder::new(" ").stage(source_stage()).build().unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-NAME"));
    }

    #[test]
    fn test_duplicate_stage() {
        let err = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(build_stage())
            .stage(StageSpec::new("Build").with_action(Arc::new(StaticAction::succeeding("x")), 1))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-DUPLICATE-STAGE"));
        assert_eq!(err.stages, vec!["Build".to_string()]);
    }

    #[test]
    fn test_empty_stage() {
        let err = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(StageSpec::new("Nothing"))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-EMPTY-STAGE"));
    }

    #[test]
    fn test_duplicate_action() {
        let stage = StageSpec::new("Check")
            .with_action(Arc::new(StaticAction::succeeding("a")), 1)
            .with_action(Arc::new(StaticAction::succeeding("a")), 2);
        let err = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(stage)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-DUPLICATE-ACTION"));
    }

    #[test]
    fn test_source_must_come_first() {
        let err = PipelineBuilder::new("p").stage(build_stage()).build().unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-SOURCE-FIRST"));

        let err = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(StageSpec::new("Late").with_action(
                Arc::new(StaticAction::succeeding("late-source").with_category(ActionCategory::Source)),
                1,
            ))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-SOURCE-FIRST"));
    }

    #[test]
    fn test_zero_run_order() {
        let stage = StageSpec::new("Check").with_action(Arc::new(StaticAction::succeeding("a")), 0);
        let err = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(stage)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-RUN-ORDER"));
    }

    #[test]
    fn test_missing_artifact() {
        let stage = StageSpec::new("Deploy").with_action(
            Arc::new(StaticAction::succeeding("CodeDeploy").reading("image")),
            1,
        );
        let err = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(stage)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-MISSING-ARTIFACT"));
    }

    #[test]
    fn test_same_run_order_cannot_feed_itself() {
        let stage = StageSpec::new("Build")
            .with_action(Arc::new(StaticAction::succeeding("produce").producing("image")), 1)
            .with_action(Arc::new(StaticAction::succeeding("consume").reading("image")), 1);
        let err = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(stage)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-MISSING-ARTIFACT"));

        let stage = StageSpec::new("Build")
            .with_action(Arc::new(StaticAction::succeeding("produce").producing("image")), 1)
            .with_action(Arc::new(StaticAction::succeeding("consume").reading("image")), 2);
        assert!(PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(stage)
            .build()
            .is_ok());
    }

    #[test]
    fn test_duplicate_artifact() {
        let stage = StageSpec::new("Build")
            .with_action(Arc::new(StaticAction::succeeding("again").producing("git")), 1);
        let err = PipelineBuilder::new("p")
            .stage(source_stage())
            .stage(stage)
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-DUPLICATE-ARTIFACT"));
    }
}
