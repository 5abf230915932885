//! Notification fan-out: the subscribers that turn bus events into chat
//! messages.
//!
//! Both notifiers are [`EventSink`](crate::events::EventSink)s. The bus
//! runs them on their own tasks, so a delivery failure is logged by the bus
//! and never reaches pipeline state.

mod approval;
mod lifecycle;
mod rules;
#[cfg(feature = "slack")]
mod slack;

pub use approval::{render_approval_message, ApprovalDigest, ApprovalNotifier};
pub use lifecycle::{render_lifecycle_message, LifecycleNotifier};
pub use rules::{ChatTarget, NotificationRule};
#[cfg(feature = "slack")]
pub use slack::{SlackChatClient, SLACK_API_BASE_URL};
