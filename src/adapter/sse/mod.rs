//! Server-sent-events wire format and the live-connection registry.
//!
//! The registry tracks every open SSE channel per consumer address. A
//! consumer may hold several connections (one per tab); a frame pushed to an
//! address goes to all of them. Send failures evict the dead channel, so the
//! registry converges on live connections without a separate reaper.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::event::DomainEvent;
use crate::domain::id::Address;
use crate::error::Result;

/// One wire frame in `text/event-stream` framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Named event with a JSON data payload.
    Event { name: String, data: String },
    /// Comment line used as a keep-alive.
    Heartbeat,
}

impl SseFrame {
    pub fn event(event: &DomainEvent) -> Result<Self> {
        Ok(Self::Event {
            name: event.sse_event().to_string(),
            data: serde_json::to_string(event)?,
        })
    }

    /// Replay frame for a stored delivery payload.
    pub fn replay(name: &str, payload: &serde_json::Value) -> Result<Self> {
        Ok(Self::Event {
            name: name.to_string(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Encode into the bytes that go on the wire.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Event { name, data } => format!("event: {name}\ndata: {data}\n\n"),
            Self::Heartbeat => ": keep-alive\n\n".to_string(),
        }
    }
}

struct Connection {
    id: Uuid,
    tx: mpsc::Sender<SseFrame>,
}

/// Registry of open SSE connections keyed by consumer address.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Address, Vec<Connection>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection; returns its id for later removal.
    pub fn register(&self, address: Address, tx: mpsc::Sender<SseFrame>) -> Uuid {
        let id = Uuid::new_v4();
        self.connections
            .entry(address)
            .or_default()
            .push(Connection { id, tx });
        id
    }

    pub fn unregister(&self, address: &Address, id: Uuid) {
        if let Some(mut entry) = self.connections.get_mut(address) {
            entry.retain(|c| c.id != id);
            let empty = entry.is_empty();
            drop(entry);
            if empty {
                self.connections.remove_if(address, |_, v| v.is_empty());
            }
        }
    }

    #[must_use]
    pub fn is_connected(&self, address: &Address) -> bool {
        self.connections
            .get(address)
            .map(|c| !c.is_empty())
            .unwrap_or(false)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|e| e.value().len()).sum()
    }

    /// Push a frame to every connection of an address. Returns the number of
    /// channels that took the frame; full or closed channels are evicted.
    pub fn send(&self, address: &Address, frame: &SseFrame) -> usize {
        let Some(mut entry) = self.connections.get_mut(address) else {
            return 0;
        };

        let before = entry.len();
        entry.retain(|c| c.tx.try_send(frame.clone()).is_ok());
        let delivered = entry.len();
        if delivered < before {
            debug!(
                address = %address,
                evicted = before - delivered,
                "Evicted dead SSE connections"
            );
        }
        delivered
    }

    /// Heartbeat every connection, evicting the ones that cannot take it.
    pub fn heartbeat(&self) {
        for mut entry in self.connections.iter_mut() {
            entry
                .value_mut()
                .retain(|c| c.tx.try_send(SseFrame::Heartbeat).is_ok());
        }
        self.connections.retain(|_, v| !v.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer() -> Address {
        Address::from("0x2222222222222222222222222222222222222222")
    }

    #[test]
    fn frame_encoding() {
        let frame = SseFrame::Event {
            name: "pending-trades".into(),
            data: r#"{"broadcastId":"b-1"}"#.into(),
        };
        assert_eq!(
            frame.encode(),
            "event: pending-trades\ndata: {\"broadcastId\":\"b-1\"}\n\n"
        );
        assert_eq!(SseFrame::Heartbeat.encode(), ": keep-alive\n\n");
    }

    #[tokio::test]
    async fn send_reaches_every_connection_of_an_address() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        registry.register(consumer(), tx1);
        registry.register(consumer(), tx2);

        let sent = registry.send(&consumer(), &SseFrame::Heartbeat);
        assert_eq!(sent, 2);
        assert_eq!(rx1.recv().await, Some(SseFrame::Heartbeat));
        assert_eq!(rx2.recv().await, Some(SseFrame::Heartbeat));
    }

    #[tokio::test]
    async fn closed_channel_is_evicted_on_send() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::channel(4);
        registry.register(consumer(), tx);
        drop(rx);

        assert_eq!(registry.send(&consumer(), &SseFrame::Heartbeat), 0);
        assert!(!registry.is_connected(&consumer()));
    }

    #[tokio::test]
    async fn unregister_removes_one_connection() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let id = registry.register(consumer(), tx1);
        registry.register(consumer(), tx2);

        registry.unregister(&consumer(), id);
        assert_eq!(registry.connection_count(), 1);
        assert!(registry.is_connected(&consumer()));
    }

    #[tokio::test]
    async fn heartbeat_reaps_full_channels() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(SseFrame::Heartbeat).unwrap();
        registry.register(consumer(), tx);

        registry.heartbeat();
        assert!(!registry.is_connected(&consumer()));
    }
}
