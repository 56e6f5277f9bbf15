//! Persistence ports for the lifecycle stores.
//!
//! The subscription and confirmation tables are written only through these
//! traits; no other code path touches them.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::domain::account::{ConsumerAccount, GeneratorAccount};
use crate::domain::broadcast::TradeBroadcast;
use crate::domain::confirmation::{ConfirmationStatus, TradeConfirmation};
use crate::domain::delivery::DeliveryRecord;
use crate::domain::id::{
    Address, BroadcastId, ConfirmationId, DeliveryId, StrategyId, SubscriptionId, TxHash,
};
use crate::domain::strategy::Strategy;
use crate::domain::subscription::Subscription;
use crate::error::Result;

/// Storage operations for subscriptions.
pub trait SubscriptionStore: Send + Sync {
    /// Insert a new subscription. Fails with a conflict when an active row
    /// already exists for the (generator, consumer) pair or the tx hash has
    /// been seen before.
    fn insert(&self, subscription: &Subscription) -> impl Future<Output = Result<()>> + Send;

    fn get(
        &self,
        id: &SubscriptionId,
    ) -> impl Future<Output = Result<Option<Subscription>>> + Send;

    /// Chain-event dedupe lookup.
    fn find_by_tx_hash(
        &self,
        tx_hash: &TxHash,
    ) -> impl Future<Output = Result<Option<Subscription>>> + Send;

    /// Active and unexpired subscriptions held by a consumer.
    fn active_for_consumer(
        &self,
        consumer: &Address,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Subscription>>> + Send;

    /// Active and unexpired subscriptions pointing at a generator.
    fn subscribers_of(
        &self,
        generator: &Address,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Subscription>>> + Send;

    /// Flip `is_active` off for every active row past its term; returns the
    /// rows that were transitioned (a repeat call transitions none).
    fn deactivate_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Subscription>>> + Send;

    /// Direct flag flip; returns the updated row.
    fn set_active(
        &self,
        id: &SubscriptionId,
        is_active: bool,
    ) -> impl Future<Output = Result<Subscription>> + Send;

    /// Deactivate the active row for a pair, if any; returns it.
    fn deactivate_pair(
        &self,
        generator: &Address,
        consumer: &Address,
    ) -> impl Future<Output = Result<Option<Subscription>>> + Send;

    /// Every generator a consumer has ever subscribed to, active or not.
    fn generators_for_consumer(
        &self,
        consumer: &Address,
    ) -> impl Future<Output = Result<Vec<Address>>> + Send;
}

/// Storage operations for generator and consumer accounts.
pub trait AccountStore: Send + Sync {
    fn upsert_generator(
        &self,
        account: &GeneratorAccount,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_generator(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Option<GeneratorAccount>>> + Send;

    /// Insert or refresh a consumer record. An existing encrypted address is
    /// kept when the new record carries none.
    fn upsert_consumer(
        &self,
        account: &ConsumerAccount,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_consumer(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Option<ConsumerAccount>>> + Send;
}

/// Storage operations for strategies.
pub trait StrategyStore: Send + Sync {
    /// Insert a strategy. Fails with a conflict when the name is already
    /// taken (case-insensitive).
    fn insert_strategy(&self, strategy: &Strategy) -> impl Future<Output = Result<()>> + Send;

    fn get_strategy(
        &self,
        id: &StrategyId,
    ) -> impl Future<Output = Result<Option<Strategy>>> + Send;
}

/// Storage operations for broadcasts.
pub trait BroadcastStore: Send + Sync {
    /// Persist one broadcast row and its fan-out confirmations as a single
    /// unit of work. A duplicate correlation id fails the whole unit with a
    /// conflict and writes nothing.
    fn create_with_confirmations(
        &self,
        broadcast: &TradeBroadcast,
        confirmations: &[TradeConfirmation],
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_broadcast(
        &self,
        id: &BroadcastId,
    ) -> impl Future<Output = Result<Option<TradeBroadcast>>> + Send;

    /// Broadcasts past expiry that still have pending confirmations.
    fn expired_with_pending(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<TradeBroadcast>>> + Send;

    /// Broadcasts that expire within `window` from `now` (but have not yet).
    fn expiring_within(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> impl Future<Output = Result<Vec<TradeBroadcast>>> + Send;

    /// Reconciliation read for reconnecting consumers: broadcasts created
    /// after `since` by any of the given generators.
    fn created_since_for_generators(
        &self,
        generators: &[Address],
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<TradeBroadcast>>> + Send;
}

/// Storage operations for confirmations. All transitions are
/// compare-and-set: they succeed only if the row is still in the expected
/// source status at commit time, and report `false` otherwise.
pub trait ConfirmationStore: Send + Sync {
    fn get_confirmation(
        &self,
        id: &ConfirmationId,
    ) -> impl Future<Output = Result<Option<TradeConfirmation>>> + Send;

    fn confirmations_for_broadcast(
        &self,
        broadcast_id: &BroadcastId,
    ) -> impl Future<Output = Result<Vec<TradeConfirmation>>> + Send;

    fn pending_for_broadcast(
        &self,
        broadcast_id: &BroadcastId,
    ) -> impl Future<Output = Result<Vec<TradeConfirmation>>> + Send;

    /// CAS `pending -> accepted|rejected`, writing the modified parameters
    /// and `decided_at` in the same statement.
    fn record_decision(
        &self,
        id: &ConfirmationId,
        status: ConfirmationStatus,
        modified_parameters: &Value,
        decided_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// CAS `accepted -> executing`.
    fn begin_execution(
        &self,
        id: &ConfirmationId,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// CAS `executing -> executed` with the receipt fields.
    fn record_execution_success(
        &self,
        id: &ConfirmationId,
        tx_hash: &TxHash,
        gas_used: u64,
        gas_price: Option<&str>,
        executed_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// CAS `executing -> failed` with the error message.
    fn record_execution_failure(
        &self,
        id: &ConfirmationId,
        error_message: &str,
        executed_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Bulk CAS `pending -> expired` for one broadcast; returns the rows
    /// that were transitioned.
    fn expire_pending(
        &self,
        broadcast_id: &BroadcastId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<TradeConfirmation>>> + Send;
}

/// Storage operations for delivery records.
pub trait DeliveryStore: Send + Sync {
    fn enqueue(&self, record: &DeliveryRecord) -> impl Future<Output = Result<()>> + Send;

    /// Queued or failed records still under the retry cap.
    fn retryable(
        &self,
        max_retries: i32,
    ) -> impl Future<Output = Result<Vec<DeliveryRecord>>> + Send;

    fn mark_delivered(
        &self,
        id: &DeliveryId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Record a failed attempt; returns the new retry count.
    fn mark_failed_attempt(
        &self,
        id: &DeliveryId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<i32>> + Send;

    fn undelivered_for(
        &self,
        consumer: &Address,
    ) -> impl Future<Output = Result<Vec<DeliveryRecord>>> + Send;

    fn last_delivered_at(
        &self,
        consumer: &Address,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>>> + Send;
}
