//! Delivery service: SSE push with queue-and-retry for offline consumers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::adapter::sse::{ConnectionRegistry, SseFrame};
use crate::config::DeliveryConfig;
use crate::domain::broadcast::TradeBroadcast;
use crate::domain::delivery::DeliveryRecord;
use crate::domain::event::DomainEvent;
use crate::domain::id::Address;
use crate::error::Result;
use crate::port::store::{BroadcastStore, DeliveryStore, SubscriptionStore};

use super::dispatcher::EventDispatcher;

/// Connectivity and backlog snapshot for one consumer.
#[derive(Debug, Clone)]
pub struct DeliveryHealth {
    pub connected: bool,
    pub undelivered: usize,
    pub last_delivered_at: Option<DateTime<Utc>>,
}

pub struct DeliveryService<S> {
    store: Arc<S>,
    connections: Arc<ConnectionRegistry>,
    dispatcher: EventDispatcher,
    config: DeliveryConfig,
}

impl<S> DeliveryService<S>
where
    S: DeliveryStore + BroadcastStore + SubscriptionStore + Send + Sync,
{
    pub fn new(
        store: Arc<S>,
        connections: Arc<ConnectionRegistry>,
        dispatcher: EventDispatcher,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            store,
            connections,
            dispatcher,
            config,
        }
    }

    /// Push one event to its target, queueing a delivery record when no
    /// connection takes it. Events without a push target are ignored.
    pub async fn dispatch(&self, event: &DomainEvent) -> Result<()> {
        let Some(target) = event.push_target() else {
            return Ok(());
        };
        let frame = SseFrame::event(event)?;

        if self.connections.send(target, &frame) > 0 {
            debug!(consumer = %target, event = event.sse_event(), "Pushed event");
            return Ok(());
        }

        let mut record = DeliveryRecord::queued(
            target.clone(),
            event.sse_event(),
            serde_json::to_value(event)?,
            Utc::now(),
        );
        if let Some(broadcast_id) = event.broadcast_id() {
            record = record.with_broadcast(broadcast_id.clone());
        }
        self.store.enqueue(&record).await?;
        info!(
            consumer = %target,
            event = event.sse_event(),
            delivery_id = %record.id,
            "Consumer offline, delivery queued"
        );
        Ok(())
    }

    /// Broadcasts created after `since` by generators the consumer has ever
    /// subscribed to. Reconciliation read for reconnecting consumers.
    pub async fn missed_broadcasts(
        &self,
        consumer: &Address,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeBroadcast>> {
        let generators = self.store.generators_for_consumer(consumer).await?;
        self.store
            .created_since_for_generators(&generators, since)
            .await
    }

    /// Re-attempt queued and failed deliveries under the retry cap. Returns
    /// the number delivered this pass.
    pub async fn retry_failed(&self) -> Result<usize> {
        let records = self.store.retryable(self.config.max_retries).await?;
        let mut delivered = 0;

        for record in records {
            let frame = SseFrame::replay(&record.event_name, &record.payload)?;
            if self.connections.send(&record.consumer, &frame) > 0 {
                self.store.mark_delivered(&record.id, Utc::now()).await?;
                delivered += 1;
                self.dispatcher.publish(DomainEvent::DeliverySuccess {
                    delivery_id: record.id.clone(),
                    consumer: record.consumer.clone(),
                });
            } else {
                let retry_count = self.store.mark_failed_attempt(&record.id, Utc::now()).await?;
                debug!(
                    delivery_id = %record.id,
                    consumer = %record.consumer,
                    retry_count,
                    "Delivery retry failed, consumer still offline"
                );
                self.dispatcher.publish(DomainEvent::DeliveryRetry {
                    delivery_id: record.id.clone(),
                    consumer: record.consumer.clone(),
                    retry_count,
                });
            }
        }
        Ok(delivered)
    }

    pub async fn delivery_health(&self, consumer: &Address) -> Result<DeliveryHealth> {
        Ok(DeliveryHealth {
            connected: self.connections.is_connected(consumer),
            undelivered: self.store.undelivered_for(consumer).await?.len(),
            last_delivered_at: self.store.last_delivered_at(consumer).await?,
        })
    }

    /// Event pump and retry/heartbeat loop, stopped through the shutdown
    /// channel.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.dispatcher.subscribe();
        let mut retry_interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.retry_interval_secs,
        ));
        let mut heartbeat_interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.heartbeat_interval_secs,
        ));

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        if let Err(e) = self.dispatch(&event).await {
                            error!(error = %e, kind = event.kind(), "Event dispatch failed");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Delivery pump lagged behind the dispatcher");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("Dispatcher closed, delivery service stopping");
                        return;
                    }
                },
                _ = retry_interval.tick() => {
                    if let Err(e) = self.retry_failed().await {
                        error!(error = %e, "Delivery retry pass failed");
                    }
                }
                _ = heartbeat_interval.tick() => {
                    self.connections.heartbeat();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Delivery service stopping");
                        return;
                    }
                }
            }
        }
    }
}
