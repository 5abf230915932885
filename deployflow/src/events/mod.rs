//! Notification fan-out.
//!
//! Pipeline code publishes [`BusEvent`](crate::core::BusEvent)s on the
//! [`NotificationBus`]; notifiers subscribe as [`EventSink`]s.

mod bus;
mod sink;

pub use bus::{BusMetrics, NotificationBus};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink};
