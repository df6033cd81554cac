//! The seam between aggregates and the event dispatcher.

use crate::message::EventRef;

/// Receives domain events recorded by aggregates.
///
/// `publish_all` falls back to sequential `publish`. Implementors with a
/// native batch path override it. Delivery is fire-and-forget: a publisher
/// returns once events are handed off, not when handlers finish.
pub trait EventPublisher: Send + Sync {
    /// Publishes a single event.
    fn publish(&self, event: EventRef);

    /// Publishes a batch of events in order.
    fn publish_all(&self, events: Vec<EventRef>) {
        for event in events {
            self.publish(event);
        }
    }
}
