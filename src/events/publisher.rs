//! High-throughput publisher for supervision lifecycle events.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::SupervisionEvent;

/// Fan-out publisher backed by a broadcast channel.
///
/// Observers register with [`EventPublisher::subscribe`]; publishing with no
/// subscribers is acceptable and the event is simply dropped.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published, stamped at publish time.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: SupervisionEvent,
    pub published_at: DateTime<Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: SupervisionEvent) {
        tracing::debug!(event = event.name(), "publishing supervision event");
        let published = PublishedEvent {
            event,
            published_at: Utc::now(),
        };
        // send() errors only when there are no subscribers, which is fine
        let _ = self.sender.send(published);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}
