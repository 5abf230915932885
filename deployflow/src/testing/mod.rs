//! Testing utilities for deployflow pipelines.
//!
//! This module provides:
//! - Scripted actions and a shared call journal
//! - In-memory fakes for every managed-service port
//! - A harness that wires a scope, bus and approval service together

mod fakes;
mod fixtures;
mod mocks;

pub use fakes::{
    FakeAutoscaling, FakeBuild, FakeChat, FakeDeploy, FakeGit, FakeObjects, Fakes, UnavailableOrchestration,
};
pub use fixtures::{git_artifact, seeded_secret_store, TestHarness, TASKDEF_BUNDLE};
pub use mocks::{Journal, StaticAction};
