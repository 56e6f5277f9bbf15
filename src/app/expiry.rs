//! Background expiry monitor.
//!
//! One sweep per interval: expired broadcasts get their still-pending
//! confirmations bulk-transitioned to `expired`, broadcasts nearing expiry
//! get warnings, and subscriptions past term are deactivated. Sweep errors
//! are logged and the loop keeps running.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::ExpiryConfig;
use crate::domain::event::DomainEvent;
use crate::error::Result;
use crate::port::store::{BroadcastStore, ConfirmationStore, SubscriptionStore};

use super::dispatcher::EventDispatcher;
use super::registry::SubscriptionRegistry;

pub struct ExpiryMonitor<S> {
    store: Arc<S>,
    registry: Arc<SubscriptionRegistry<S>>,
    dispatcher: EventDispatcher,
    config: ExpiryConfig,
}

impl<S> ExpiryMonitor<S>
where
    S: BroadcastStore + ConfirmationStore + SubscriptionStore,
{
    pub fn new(
        store: Arc<S>,
        registry: Arc<SubscriptionRegistry<S>>,
        dispatcher: EventDispatcher,
        config: ExpiryConfig,
    ) -> Self {
        Self {
            store,
            registry,
            dispatcher,
            config,
        }
    }

    /// Expire pending confirmations of broadcasts past their window.
    /// Returns the number of confirmations transitioned; idempotent.
    pub async fn sweep(&self) -> Result<usize> {
        let now = Utc::now();
        let mut total = 0;

        for broadcast in self.store.expired_with_pending(now).await? {
            let expired = self.store.expire_pending(&broadcast.id, now).await?;
            if expired.is_empty() {
                continue;
            }
            info!(
                broadcast_id = %broadcast.id,
                expired = expired.len(),
                "Expired pending confirmations"
            );
            total += expired.len();
            for confirmation in expired {
                self.dispatcher.publish(DomainEvent::TradeExpired {
                    confirmation_id: confirmation.id,
                    broadcast_id: confirmation.broadcast_id,
                    consumer: confirmation.consumer,
                });
            }
        }
        Ok(total)
    }

    /// Warn consumers with pending confirmations on broadcasts that expire
    /// soon. Mutates nothing; safe to repeat.
    pub async fn send_expiry_warnings(&self) -> Result<usize> {
        let now = Utc::now();
        let window = chrono::Duration::minutes(self.config.warning_window_minutes);
        let mut total = 0;

        for broadcast in self.store.expiring_within(now, window).await? {
            for confirmation in self.store.pending_for_broadcast(&broadcast.id).await? {
                self.dispatcher.publish(DomainEvent::ExpiryWarning {
                    confirmation_id: confirmation.id,
                    broadcast_id: confirmation.broadcast_id,
                    consumer: confirmation.consumer,
                    expires_at: broadcast.expires_at,
                });
                total += 1;
            }
        }
        Ok(total)
    }

    /// Periodic sweep loop, stopped through the shutdown channel.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>)
    where
        S: Send + Sync,
    {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.sweep_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Expiry sweep failed");
                    }
                    if let Err(e) = self.send_expiry_warnings().await {
                        error!(error = %e, "Expiry warnings failed");
                    }
                    if let Err(e) = self.registry.check_expiry().await {
                        error!(error = %e, "Subscription expiry check failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Expiry monitor stopping");
                        return;
                    }
                }
            }
        }
    }
}
