//! Stage and action specifications.

use super::StageLayout;
use crate::stages::Action;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An action placed in a stage at a run order.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    /// The action implementation.
    pub action: Arc<dyn Action>,
    /// Actions with equal run order run concurrently; lower orders run first.
    pub run_order: u32,
}

impl ActionSpec {
    /// Creates a new action specification.
    #[must_use]
    pub fn new(action: Arc<dyn Action>, run_order: u32) -> Self {
        Self { action, run_order }
    }

    /// Returns the action name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.action.name()
    }
}

/// Specification for a single stage.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// Actions in declaration order.
    pub actions: Vec<ActionSpec>,
}

impl StageSpec {
    /// Creates an empty stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    /// Adds an action at a run order.
    #[must_use]
    pub fn with_action(mut self, action: Arc<dyn Action>, run_order: u32) -> Self {
        self.actions.push(ActionSpec::new(action, run_order));
        self
    }

    /// Groups the actions by run order, lowest first.
    #[must_use]
    pub fn run_order_groups(&self) -> Vec<(u32, Vec<&ActionSpec>)> {
        let mut groups: BTreeMap<u32, Vec<&ActionSpec>> = BTreeMap::new();
        for spec in &self.actions {
            groups.entry(spec.run_order).or_default().push(spec);
        }
        groups.into_iter().collect()
    }

    /// Looks up an action by name.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|spec| spec.name() == name)
    }
}

/// A validated pipeline: a name and its stages in execution order.
///
/// Obtained from [`PipelineBuilder::build`](super::PipelineBuilder::build).
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    name: String,
    stages: Vec<StageSpec>,
}

impl PipelineDefinition {
    pub(super) fn new(name: String, stages: Vec<StageSpec>) -> Self {
        Self { name, stages }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name.as_str()).collect()
    }

    /// Returns the layout recorded in pipeline state.
    #[must_use]
    pub fn layout(&self) -> Vec<StageLayout> {
        self.stages
            .iter()
            .map(|stage| StageLayout {
                stage_name: stage.name.clone(),
                action_names: stage.actions.iter().map(|spec| spec.name().to_string()).collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticAction;

    #[test]
    fn test_run_order_groups() {
        let stage = StageSpec::new("DeployEcs")
            .with_action(Arc::new(StaticAction::succeeding("restart")), 3)
            .with_action(Arc::new(StaticAction::succeeding("stop")), 1)
            .with_action(Arc::new(StaticAction::succeeding("deploy")), 2)
            .with_action(Arc::new(StaticAction::succeeding("audit")), 2);

        let groups: Vec<(u32, Vec<&str>)> = stage
            .run_order_groups()
            .into_iter()
            .map(|(order, specs)| (order, specs.iter().map(|s| s.name()).collect()))
            .collect();

        assert_eq!(
            groups,
            vec![(1, vec!["stop"]), (2, vec!["deploy", "audit"]), (3, vec!["restart"])]
        );
        assert!(stage.action("deploy").is_some());
        assert!(stage.action("missing").is_none());
    }
}
