//! Event sink trait and implementations.

use crate::core::{ApprovalEvent, BusEvent, LifecycleEventKind, PipelineEvent};
use crate::errors::NotifyError;
use async_trait::async_trait;
use tracing::{debug, info, Level};

/// A subscriber on the notification bus.
///
/// Errors are logged by the bus and go no further.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handles one event.
    async fn emit(&self, event: &BusEvent) -> Result<(), NotifyError>;
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &BusEvent) {
        let (stage, action, detail) = match event {
            BusEvent::Lifecycle(e) => (e.stage.as_deref(), e.action.as_deref(), e.detail.as_deref()),
            BusEvent::ApprovalPending(e) => (Some(e.stage_name.as_str()), Some(e.action_name.as_str()), None),
        };

        if self.level == Level::DEBUG {
            debug!(
                event_type = event.label(),
                pipeline = event.pipeline_name(),
                stage,
                action,
                detail,
                "Event: {}", event.label()
            );
        } else {
            info!(
                event_type = event.label(),
                pipeline = event.pipeline_name(),
                stage,
                action,
                detail,
                "Event: {}", event.label()
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    fn name(&self) -> &str {
        "logging"
    }

    async fn emit(&self, event: &BusEvent) -> Result<(), NotifyError> {
        self.log_event(event);
        Ok(())
    }
}

/// A collecting event sink for tests and dry runs.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<BusEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<BusEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the collected lifecycle events.
    #[must_use]
    pub fn lifecycle(&self) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                BusEvent::Lifecycle(event) => Some(event.clone()),
                BusEvent::ApprovalPending(_) => None,
            })
            .collect()
    }

    /// Returns the kinds of the collected lifecycle events, in order.
    #[must_use]
    pub fn lifecycle_kinds(&self) -> Vec<LifecycleEventKind> {
        self.lifecycle().into_iter().map(|e| e.kind).collect()
    }

    /// Returns the collected approval events.
    #[must_use]
    pub fn approvals(&self) -> Vec<ApprovalEvent> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                BusEvent::ApprovalPending(event) => Some(event.clone()),
                BusEvent::Lifecycle(_) => None,
            })
            .collect()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    fn name(&self) -> &str {
        "collecting"
    }

    async fn emit(&self, event: &BusEvent) -> Result<(), NotifyError> {
        self.events.write().push(event.clone());
        Ok(())
    }
}
