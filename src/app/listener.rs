//! Blockchain event listener.
//!
//! Owns the chain client and drives the subscription lifecycle from on-chain
//! events. Handlers are idempotent keyed on tx hash, so redelivered or
//! backfilled events are safe to process twice. A periodic probe detects
//! silent connection death; reconnection uses exponential backoff and
//! re-subscribes to all tracked event types.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ChainConfig;
use crate::domain::account::{ConsumerAccount, GeneratorAccount};
use crate::domain::event::DomainEvent;
use crate::domain::id::{Address, TxHash};
use crate::error::{Error, Result};
use crate::port::chain::{ChainClient, ChainEvent};
use crate::port::store::{AccountStore, SubscriptionStore};

use super::dispatcher::EventDispatcher;
use super::registry::{SubscribeRequest, SubscriptionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Listening,
    Reconnecting,
}

enum Step {
    Event(Option<ChainEvent>),
    Probe,
    Shutdown,
}

pub struct ChainEventListener<S, C> {
    client: C,
    store: Arc<S>,
    registry: Arc<SubscriptionRegistry<S>>,
    dispatcher: EventDispatcher,
    config: ChainConfig,
    state: ListenerState,
}

impl<S, C> ChainEventListener<S, C>
where
    S: SubscriptionStore + AccountStore,
    C: ChainClient,
{
    pub fn new(
        client: C,
        store: Arc<S>,
        registry: Arc<SubscriptionRegistry<S>>,
        dispatcher: EventDispatcher,
        config: ChainConfig,
    ) -> Self {
        Self {
            client,
            store,
            registry,
            dispatcher,
            config,
            state: ListenerState::Disconnected,
        }
    }

    #[must_use]
    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Connect, subscribe, and process events until shutdown. Returns an
    /// error only when reconnection attempts are exhausted.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.client.connect().await?;
        self.client.subscribe_events().await?;
        self.state = ListenerState::Listening;
        info!(endpoint = %self.client.endpoint(), "Chain listener started");

        let probe_interval = Duration::from_secs(self.config.probe_interval_secs);

        loop {
            let step = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        Step::Shutdown
                    } else {
                        continue;
                    }
                }
                next = timeout(probe_interval, self.client.next_event()) => match next {
                    Ok(event) => Step::Event(event),
                    Err(_) => Step::Probe,
                },
            };

            match step {
                Step::Shutdown => {
                    info!("Chain listener stopping");
                    self.state = ListenerState::Disconnected;
                    return Ok(());
                }
                Step::Probe => {
                    if let Err(e) = self.client.probe().await {
                        warn!(error = %e, "Liveness probe failed");
                        self.reconnect().await?;
                    }
                }
                Step::Event(Some(event)) => {
                    if let ChainEvent::Disconnected { reason } = &event {
                        warn!(reason = %reason, "Chain stream disconnected");
                        self.reconnect().await?;
                        continue;
                    }
                    if let Err(e) = self.handle_event(event).await {
                        error!(error = %e, "Chain event handling failed");
                    }
                }
                Step::Event(None) => {
                    warn!("Chain stream ended");
                    self.reconnect().await?;
                }
            }
        }
    }

    /// Replay a block range through the live-event handlers. Idempotency
    /// makes overlap with the live stream harmless.
    pub async fn backfill(&mut self, from_block: u64, to_block: u64) -> Result<usize> {
        let events = self.client.historical_events(from_block, to_block).await?;
        let count = events.len();
        info!(from_block, to_block, count, "Backfilling chain events");

        for event in events {
            if let Err(e) = self.handle_event(event).await {
                error!(error = %e, "Backfill event handling failed");
            }
        }
        Ok(count)
    }

    async fn handle_event(&mut self, event: ChainEvent) -> Result<()> {
        match event {
            ChainEvent::SubscriptionCreated {
                generator,
                encrypted_subscriber,
                tx_hash,
            } => {
                self.handle_subscription_created(generator, encrypted_subscriber, tx_hash)
                    .await
            }
            ChainEvent::SubscriptionCancelled { generator, tx_hash } => {
                self.handle_subscription_cancelled(generator, tx_hash).await
            }
            ChainEvent::GeneratorRegistered { generator, tx_hash } => {
                self.handle_generator_registered(generator, tx_hash).await
            }
            ChainEvent::Connected => {
                self.state = ListenerState::Listening;
                Ok(())
            }
            ChainEvent::Disconnected { .. } => Ok(()),
        }
    }

    async fn handle_subscription_created(
        &mut self,
        generator: Address,
        encrypted_subscriber: String,
        tx_hash: TxHash,
    ) -> Result<()> {
        if self.store.find_by_tx_hash(&tx_hash).await?.is_some() {
            debug!(tx_hash = %tx_hash, "Subscription event already processed");
            return Ok(());
        }

        // The log only names the generator; the payer and fee come from the
        // originating transaction.
        let tx = self.client.transaction(&tx_hash).await?;
        let consumer = tx.from.clone();

        self.store
            .upsert_consumer(&ConsumerAccount {
                address: consumer.clone(),
                encrypted_address: Some(encrypted_subscriber.clone()),
                created_at: Utc::now(),
            })
            .await?;

        match self
            .registry
            .subscribe(SubscribeRequest {
                generator,
                consumer,
                fee_amount: tx.value_wei,
                encrypted_address: Some(encrypted_subscriber),
                tx_hash: Some(tx_hash.clone()),
            })
            .await
        {
            Ok(_) => Ok(()),
            // A concurrent duplicate for the pair or tx; nothing to do.
            Err(Error::Conflict(reason)) => {
                debug!(tx_hash = %tx_hash, reason = %reason, "Duplicate subscription event");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_subscription_cancelled(
        &mut self,
        generator: Address,
        tx_hash: TxHash,
    ) -> Result<()> {
        let tx = self.client.transaction(&tx_hash).await?;
        self.registry.cancel(&generator, &tx.from).await?;
        Ok(())
    }

    async fn handle_generator_registered(
        &mut self,
        generator: Address,
        tx_hash: TxHash,
    ) -> Result<()> {
        let existing = self.store.get_generator(&generator).await?;
        if existing.is_some() {
            debug!(generator = %generator, "Generator already registered");
            return Ok(());
        }

        let account = GeneratorAccount::new(generator.clone(), Utc::now()).with_tx_hash(tx_hash);
        self.store.upsert_generator(&account).await?;
        info!(generator = %generator, "Generator registered from chain event");

        self.dispatcher
            .publish(DomainEvent::GeneratorRegistered { generator });
        Ok(())
    }

    /// Exponential backoff reconnect, re-subscribing on success.
    async fn reconnect(&mut self) -> Result<()> {
        self.state = ListenerState::Reconnecting;
        let reconnect = self.config.reconnect.clone();
        let mut delay_ms = reconnect.initial_delay_ms;

        for attempt in 1..=reconnect.max_attempts {
            info!(attempt, delay_ms, "Reconnecting to chain RPC");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            match self.try_reconnect().await {
                Ok(()) => {
                    info!(attempt, "Chain RPC reconnected");
                    self.state = ListenerState::Listening;
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                }
            }

            delay_ms = ((delay_ms as f64) * reconnect.backoff_multiplier) as u64;
            delay_ms = delay_ms.min(reconnect.max_delay_ms);
        }

        self.state = ListenerState::Disconnected;
        Err(Error::Connection(format!(
            "gave up reconnecting after {} attempts",
            reconnect.max_attempts
        )))
    }

    async fn try_reconnect(&mut self) -> Result<()> {
        self.client.connect().await?;
        self.client.subscribe_events().await?;
        Ok(())
    }
}
