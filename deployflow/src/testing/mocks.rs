//! Scripted actions for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{ActionCategory, ActionOutput, Artifact, ArtifactLocation};
use crate::stages::{Action, ActionContext};

/// An ordered log of calls shared between test doubles.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.calls.lock().push(entry.into());
    }

    /// Returns the entries in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Forgets every entry.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// An action that returns a fixed output.
#[derive(Debug)]
pub struct StaticAction {
    name: String,
    category: ActionCategory,
    output: ActionOutput,
    inputs: Vec<String>,
    outputs: Vec<String>,
    delay: Option<Duration>,
    journal: Option<Journal>,
    panics: bool,
}

impl StaticAction {
    /// Creates an action with the given output.
    #[must_use]
    pub fn with_output(name: impl Into<String>, output: ActionOutput) -> Self {
        Self {
            name: name.into(),
            category: ActionCategory::Invoke,
            output,
            inputs: Vec::new(),
            outputs: Vec::new(),
            delay: None,
            journal: None,
            panics: false,
        }
    }

    /// Creates an action that succeeds.
    #[must_use]
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self::with_output(name, ActionOutput::succeeded())
    }

    /// Creates an action that fails with `error`.
    #[must_use]
    pub fn failing(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::with_output(name, ActionOutput::failed(error))
    }

    /// Creates an action that panics when executed.
    #[must_use]
    pub fn panicking(name: impl Into<String>) -> Self {
        Self {
            panics: true,
            ..Self::succeeding(name)
        }
    }

    /// Sets the category. Defaults to [`ActionCategory::Invoke`].
    #[must_use]
    pub fn with_category(mut self, category: ActionCategory) -> Self {
        self.category = category;
        self
    }

    /// Declares an input artifact.
    #[must_use]
    pub fn reading(mut self, artifact: impl Into<String>) -> Self {
        self.inputs.push(artifact.into());
        self
    }

    /// Declares an output artifact and produces it on success.
    #[must_use]
    pub fn producing(mut self, artifact: impl Into<String>) -> Self {
        self.outputs.push(artifact.into());
        self
    }

    /// Sleeps before returning.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Records the action name in `journal` once the delay has passed.
    #[must_use]
    pub fn recording(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }
}

#[async_trait]
impl Action for StaticAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> ActionCategory {
        self.category
    }

    fn input_artifacts(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn output_artifacts(&self) -> Vec<String> {
        self.outputs.clone()
    }

    async fn execute(&self, _ctx: &ActionContext) -> ActionOutput {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(journal) = &self.journal {
            journal.record(self.name.clone());
        }
        assert!(!self.panics, "{} was told to panic", self.name);

        let mut output = self.output.clone();
        if output.is_success() {
            output.artifacts.extend(self.outputs.iter().map(|name| {
                Artifact::new(
                    name.clone(),
                    ArtifactLocation::Object {
                        bucket: "test".to_string(),
                        key: name.clone(),
                    },
                    "1",
                )
            }));
        }
        output
    }
}
