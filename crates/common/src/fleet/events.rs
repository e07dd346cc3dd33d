//! In-process fleet signals
//!
//! Signals are hints for waiters inside one gateway process. They carry no
//! state of their own; anyone acting on one re-reads the store.

use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 256;

/// Something that happened to the fleet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetEvent {
    /// A relay registered (or re-registered) and is online
    RelayOnline {
        relay_id: Uuid,
        tenant_id: Uuid,
        name: String,
        url: String,
    },
}

/// Broadcast channel for [`FleetEvent`]s
#[derive(Clone)]
pub struct FleetEvents {
    tx: broadcast::Sender<FleetEvent>,
}

impl FleetEvents {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: FleetEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::trace!(receivers, "Fleet event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }
}

impl Default for FleetEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online(tenant_id: Uuid) -> FleetEvent {
        FleetEvent::RelayOnline {
            relay_id: Uuid::new_v4(),
            tenant_id,
            name: "edge-1".into(),
            url: "wss://edge1:4443".into(),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        FleetEvents::new().publish(online(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let events = FleetEvents::new();
        let mut rx = events.subscribe();
        let event = online(Uuid::new_v4());
        events.publish(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}
