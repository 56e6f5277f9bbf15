//! Subscription registry: the single write path for subscription rows.

use std::sync::Arc;

use alloy_primitives::U256;
use chrono::Utc;
use tracing::{info, warn};

use crate::domain::event::DomainEvent;
use crate::domain::id::{Address, SubscriptionId, TxHash};
use crate::domain::subscription::Subscription;
use crate::error::Result;
use crate::port::cipher::AddressCipher;
use crate::port::store::SubscriptionStore;

use super::dispatcher::EventDispatcher;

/// Inputs for creating a subscription, from either the API edge or the chain
/// listener.
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    pub generator: Address,
    pub consumer: Address,
    /// Fee paid, in wei, as a decimal string.
    pub fee_amount: String,
    /// Pre-encrypted consumer address from a chain event; when absent the
    /// registry encrypts the plain address itself.
    pub encrypted_address: Option<String>,
    pub tx_hash: Option<TxHash>,
}

pub struct SubscriptionRegistry<S> {
    store: Arc<S>,
    cipher: Arc<dyn AddressCipher>,
    dispatcher: EventDispatcher,
}

impl<S: SubscriptionStore> SubscriptionRegistry<S> {
    pub fn new(store: Arc<S>, cipher: Arc<dyn AddressCipher>, dispatcher: EventDispatcher) -> Self {
        Self {
            store,
            cipher,
            dispatcher,
        }
    }

    /// Create a 30-day active subscription. A concurrent duplicate for the
    /// same pair loses with a `Conflict` from the store's unique index.
    pub async fn subscribe(&self, request: SubscribeRequest) -> Result<Subscription> {
        let now = Utc::now();
        let encrypted = match request.encrypted_address {
            Some(encrypted) => encrypted,
            None => self.cipher.encrypt(request.consumer.as_str())?,
        };

        let mut subscription = Subscription::new(
            request.generator,
            request.consumer,
            request.fee_amount,
            now,
        )?
        .with_encrypted_address(encrypted);
        if let Some(tx_hash) = request.tx_hash {
            subscription = subscription.with_tx_hash(tx_hash);
        }

        self.store.insert(&subscription).await?;

        info!(
            subscription_id = %subscription.id,
            generator = %subscription.generator,
            consumer = %subscription.consumer,
            expires_at = %subscription.expires_at,
            "Subscription created"
        );
        self.dispatcher.publish(DomainEvent::SubscriptionCreated {
            subscription_id: subscription.id.clone(),
            generator: subscription.generator.clone(),
            consumer: subscription.consumer.clone(),
            expires_at: subscription.expires_at,
        });
        Ok(subscription)
    }

    /// Deactivate every subscription past its term. Returns the number of
    /// rows flipped; a repeat run flips none.
    pub async fn check_expiry(&self) -> Result<usize> {
        let expired = self.store.deactivate_expired(Utc::now()).await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "Deactivated expired subscriptions");
        }
        for subscription in &expired {
            self.dispatcher.publish(DomainEvent::SubscriptionExpired {
                subscription_id: subscription.id.clone(),
                generator: subscription.generator.clone(),
                consumer: subscription.consumer.clone(),
            });
        }
        Ok(expired.len())
    }

    pub async fn active_subscriptions(&self, consumer: &Address) -> Result<Vec<Subscription>> {
        self.store.active_for_consumer(consumer, Utc::now()).await
    }

    pub async fn generator_subscribers(&self, generator: &Address) -> Result<Vec<Subscription>> {
        self.store.subscribers_of(generator, Utc::now()).await
    }

    /// Sum of fees over currently active subscriptions, in wei.
    pub async fn generator_revenue(&self, generator: &Address) -> Result<U256> {
        let subscribers = self.store.subscribers_of(generator, Utc::now()).await?;
        let mut total = U256::ZERO;
        for subscription in &subscribers {
            total += subscription.fee_wei()?;
        }
        Ok(total)
    }

    pub async fn update_subscription_status(
        &self,
        id: &SubscriptionId,
        is_active: bool,
    ) -> Result<Subscription> {
        let subscription = self.store.set_active(id, is_active).await?;
        self.dispatcher
            .publish(DomainEvent::SubscriptionStatusChanged {
                subscription_id: subscription.id.clone(),
                generator: subscription.generator.clone(),
                consumer: subscription.consumer.clone(),
                is_active,
            });
        Ok(subscription)
    }

    /// Deactivate the active pair row, if any. Driven by on-chain
    /// cancellation events.
    pub async fn cancel(
        &self,
        generator: &Address,
        consumer: &Address,
    ) -> Result<Option<Subscription>> {
        let cancelled = self.store.deactivate_pair(generator, consumer).await?;
        match &cancelled {
            Some(subscription) => {
                info!(
                    subscription_id = %subscription.id,
                    generator = %generator,
                    consumer = %consumer,
                    "Subscription cancelled"
                );
                self.dispatcher.publish(DomainEvent::SubscriptionCancelled {
                    generator: generator.clone(),
                    consumer: consumer.clone(),
                });
            }
            None => {
                warn!(
                    generator = %generator,
                    consumer = %consumer,
                    "Cancellation for pair with no active subscription"
                );
            }
        }
        Ok(cancelled)
    }
}
