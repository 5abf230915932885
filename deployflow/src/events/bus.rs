//! Publish/subscribe bus for pipeline notifications.
//!
//! Every subscriber gets its own queue and worker task, so a slow or
//! failing subscriber never holds up the pipeline or the other
//! subscribers. Delivery is in publish order per subscriber.

use super::EventSink;
use crate::core::BusEvent;
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Delivery counters.
#[derive(Debug, Default)]
pub struct BusMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl BusMetrics {
    /// Events handed to the bus.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Subscriber invocations that succeeded.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Subscriber invocations that returned an error or panicked.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

enum Message {
    Event(Arc<BusEvent>),
    Flush(oneshot::Sender<()>),
}

struct Subscriber {
    name: String,
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<Vec<Subscriber>>,
    metrics: BusMetrics,
}

/// The notification bus. Cloning shares the same bus.
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl NotificationBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber and starts its worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let name = sink.name().to_string();
        let inner = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Event(event) => {
                        let outcome = AssertUnwindSafe(sink.emit(&event)).catch_unwind().await;
                        let Some(inner) = inner.upgrade() else {
                            continue;
                        };
                        match outcome {
                            Ok(Ok(())) => {
                                inner.metrics.delivered.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(Err(e)) => {
                                inner.metrics.failed.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    subscriber = sink.name(),
                                    event_type = event.label(),
                                    error = %e,
                                    "Subscriber failed"
                                );
                            }
                            Err(_) => {
                                inner.metrics.failed.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    subscriber = sink.name(),
                                    event_type = event.label(),
                                    "Subscriber panicked"
                                );
                            }
                        }
                    }
                    Message::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        debug!(subscriber = %name, "Subscribed to notification bus");
        self.inner.subscribers.write().push(Subscriber { name, tx });
    }

    /// Queues an event for every subscriber and returns immediately.
    pub fn publish(&self, event: BusEvent) {
        self.inner.metrics.published.fetch_add(1, Ordering::Relaxed);
        let event = Arc::new(event);
        for subscriber in self.inner.subscribers.read().iter() {
            if subscriber.tx.send(Message::Event(event.clone())).is_err() {
                warn!(subscriber = %subscriber.name, "Subscriber worker is gone; event dropped");
            }
        }
    }

    /// Waits until every event published so far has been handled.
    pub async fn drain(&self) {
        let acks: Vec<_> = self
            .inner
            .subscribers
            .read()
            .iter()
            .filter_map(|subscriber| {
                let (ack_tx, ack_rx) = oneshot::channel();
                subscriber.tx.send(Message::Flush(ack_tx)).ok().map(|()| ack_rx)
            })
            .collect();

        for ack in acks {
            let _ = ack.await;
        }
    }

    /// Returns the number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Returns the delivery counters.
    #[must_use]
    pub fn metrics(&self) -> &BusMetrics {
        &self.inner.metrics
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .inner
            .subscribers
            .read()
            .iter()
            .map(|s| s.name.clone())
            .collect();
        f.debug_struct("NotificationBus")
            .field("subscribers", &names)
            .finish()
    }
}
