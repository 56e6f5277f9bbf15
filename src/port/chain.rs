//! Chain RPC port: event-log subscriptions and transaction lookup.

use async_trait::async_trait;

use crate::domain::id::{Address, TxHash};
use crate::error::Result;

/// Decoded on-chain event relevant to the subscription lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// A consumer paid for a subscription. The log itself carries only the
    /// generator and an opaque encrypted-subscriber blob; the real sender
    /// and paid value come from the originating transaction.
    SubscriptionCreated {
        generator: Address,
        encrypted_subscriber: String,
        tx_hash: TxHash,
    },
    SubscriptionCancelled {
        generator: Address,
        tx_hash: TxHash,
    },
    GeneratorRegistered {
        generator: Address,
        tx_hash: TxHash,
    },
    Connected,
    Disconnected {
        reason: String,
    },
}

/// Transaction fields the listener resolves for a subscription event.
#[derive(Debug, Clone)]
pub struct TxDetails {
    pub hash: TxHash,
    pub from: Address,
    /// Paid value in wei, as a decimal string.
    pub value_wei: String,
}

/// Connection to an on-chain RPC provider.
///
/// Implementations are used by a single listener task, so methods take
/// `&mut self`; the listener wraps the client with reconnect/backoff.
#[async_trait]
pub trait ChainClient: Send {
    async fn connect(&mut self) -> Result<()>;

    /// Subscribe to the three tracked event types. Called again after every
    /// reconnect.
    async fn subscribe_events(&mut self) -> Result<()>;

    /// Next decoded event, or `None` when the stream has ended.
    async fn next_event(&mut self) -> Option<ChainEvent>;

    /// Look up the originating transaction of an event.
    async fn transaction(&mut self, hash: &TxHash) -> Result<TxDetails>;

    /// Cheap liveness check; an error marks the connection dead.
    async fn probe(&mut self) -> Result<()>;

    /// Replay a block range through the same decoding as the live stream.
    async fn historical_events(
        &mut self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainEvent>>;

    fn endpoint(&self) -> &str;
}
