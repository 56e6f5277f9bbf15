//! In-process event dispatcher.
//!
//! A thin wrapper over `tokio::sync::broadcast`. Services publish typed
//! [`DomainEvent`]s; the delivery layer and tests attach receivers. Publishing
//! with no receivers attached is not an error.

use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::event::DomainEvent;

#[derive(Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: DomainEvent) {
        let kind = event.kind();
        let receivers = self.tx.send(event).unwrap_or(0);
        debug!(kind, receivers, "Published event");
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::Address;

    #[tokio::test]
    async fn events_reach_all_receivers() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx1 = dispatcher.subscribe();
        let mut rx2 = dispatcher.subscribe();

        dispatcher.publish(DomainEvent::GeneratorRegistered {
            generator: Address::from("0x1111111111111111111111111111111111111111"),
        });

        assert_eq!(rx1.recv().await.unwrap().kind(), "generatorRegistered");
        assert_eq!(rx2.recv().await.unwrap().kind(), "generatorRegistered");
    }

    #[test]
    fn publish_without_receivers_is_fine() {
        let dispatcher = EventDispatcher::new(8);
        dispatcher.publish(DomainEvent::GeneratorRegistered {
            generator: Address::from("0x1111111111111111111111111111111111111111"),
        });
    }
}
