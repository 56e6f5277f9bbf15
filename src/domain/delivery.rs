//! Delivery records: propagation bookkeeping for push targets that were
//! unreachable at broadcast time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::{Address, BroadcastId, DeliveryId, StrategyId};

/// Retry ceiling for queued/failed deliveries.
pub const MAX_DELIVERY_RETRIES: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: DeliveryId,
    pub broadcast_id: Option<BroadcastId>,
    pub strategy_id: Option<StrategyId>,
    pub consumer: Address,
    /// SSE event name to replay with.
    pub event_name: String,
    /// Serialized event payload, replayed as-is on retry.
    pub payload: Value,
    pub status: DeliveryStatus,
    pub retry_count: i32,
    pub queued_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    /// Queue a payload for a consumer with no live connection.
    #[must_use]
    pub fn queued(
        consumer: Address,
        event_name: impl Into<String>,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DeliveryId::new(),
            broadcast_id: None,
            strategy_id: None,
            consumer,
            event_name: event_name.into(),
            payload,
            status: DeliveryStatus::Queued,
            retry_count: 0,
            queued_at: now,
            last_attempt_at: None,
            delivered_at: None,
        }
    }

    #[must_use]
    pub fn with_broadcast(mut self, broadcast_id: BroadcastId) -> Self {
        self.broadcast_id = Some(broadcast_id);
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy_id: StrategyId) -> Self {
        self.strategy_id = Some(strategy_id);
        self
    }

    /// Whether the retry loop may attempt this record again.
    #[must_use]
    pub fn retryable(&self) -> bool {
        self.status != DeliveryStatus::Delivered && self.retry_count < MAX_DELIVERY_RETRIES
    }
}
