//! Typed domain events published through the in-process dispatcher.
//!
//! Components publish these instead of calling each other; the delivery
//! layer turns the consumer-facing ones into SSE frames.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::id::{Address, BroadcastId, ConfirmationId, CorrelationId, DeliveryId, SubscriptionId};

#[derive(Debug, Clone, Serialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum DomainEvent {
    #[serde(rename_all = "camelCase")]
    TradeCreated {
        confirmation_id: ConfirmationId,
        broadcast_id: BroadcastId,
        correlation_id: CorrelationId,
        generator: Address,
        consumer: Address,
        function_name: String,
        protocol: String,
        parameters: Value,
        expires_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    TradeExpired {
        confirmation_id: ConfirmationId,
        broadcast_id: BroadcastId,
        consumer: Address,
    },
    #[serde(rename_all = "camelCase")]
    ExpiryWarning {
        confirmation_id: ConfirmationId,
        broadcast_id: BroadcastId,
        consumer: Address,
        expires_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    SubscriptionCreated {
        subscription_id: SubscriptionId,
        generator: Address,
        consumer: Address,
        expires_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    SubscriptionExpired {
        subscription_id: SubscriptionId,
        generator: Address,
        consumer: Address,
    },
    #[serde(rename_all = "camelCase")]
    SubscriptionStatusChanged {
        subscription_id: SubscriptionId,
        generator: Address,
        consumer: Address,
        is_active: bool,
    },
    #[serde(rename_all = "camelCase")]
    SubscriptionCancelled {
        generator: Address,
        consumer: Address,
    },
    #[serde(rename_all = "camelCase")]
    GeneratorRegistered { generator: Address },
    #[serde(rename_all = "camelCase")]
    DeliveryRetry {
        delivery_id: DeliveryId,
        consumer: Address,
        retry_count: i32,
    },
    #[serde(rename_all = "camelCase")]
    DeliverySuccess {
        delivery_id: DeliveryId,
        consumer: Address,
    },
}

impl DomainEvent {
    /// Dispatcher-level event kind, used for logging and filtering.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TradeCreated { .. } => "tradeCreated",
            Self::TradeExpired { .. } => "tradeExpired",
            Self::ExpiryWarning { .. } => "expiryWarning",
            Self::SubscriptionCreated { .. } => "subscriptionCreated",
            Self::SubscriptionExpired { .. } => "subscriptionExpired",
            Self::SubscriptionStatusChanged { .. } => "subscriptionUpdate",
            Self::SubscriptionCancelled { .. } => "subscriptionCancelled",
            Self::GeneratorRegistered { .. } => "generatorRegistered",
            Self::DeliveryRetry { .. } => "delivery:retry",
            Self::DeliverySuccess { .. } => "delivery:success",
        }
    }

    /// SSE event name used on the wire for consumer-facing events.
    #[must_use]
    pub fn sse_event(&self) -> &'static str {
        match self {
            Self::TradeCreated { .. } => "pending-trades",
            Self::ExpiryWarning { .. } => "expiryWarning",
            other => other.kind(),
        }
    }

    /// Address this event should be pushed to, if it is consumer-facing.
    #[must_use]
    pub fn push_target(&self) -> Option<&Address> {
        match self {
            Self::TradeCreated { consumer, .. }
            | Self::TradeExpired { consumer, .. }
            | Self::ExpiryWarning { consumer, .. }
            | Self::SubscriptionCreated { consumer, .. }
            | Self::SubscriptionExpired { consumer, .. }
            | Self::SubscriptionStatusChanged { consumer, .. } => Some(consumer),
            Self::GeneratorRegistered { generator } => Some(generator),
            Self::SubscriptionCancelled { .. }
            | Self::DeliveryRetry { .. }
            | Self::DeliverySuccess { .. } => None,
        }
    }

    /// Broadcast id carried by the event, when there is one.
    #[must_use]
    pub fn broadcast_id(&self) -> Option<&BroadcastId> {
        match self {
            Self::TradeCreated { broadcast_id, .. }
            | Self::TradeExpired { broadcast_id, .. }
            | Self::ExpiryWarning { broadcast_id, .. } => Some(broadcast_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer() -> Address {
        Address::from("0x2222222222222222222222222222222222222222")
    }

    #[test]
    fn trade_created_maps_to_pending_trades() {
        let event = DomainEvent::TradeCreated {
            confirmation_id: ConfirmationId::new(),
            broadcast_id: BroadcastId::new(),
            correlation_id: CorrelationId::new(),
            generator: Address::from("0x1111111111111111111111111111111111111111"),
            consumer: consumer(),
            function_name: "supply".into(),
            protocol: "aave".into(),
            parameters: serde_json::json!({"amount": "1000"}),
            expires_at: Utc::now(),
        };
        assert_eq!(event.kind(), "tradeCreated");
        assert_eq!(event.sse_event(), "pending-trades");
        assert_eq!(event.push_target(), Some(&consumer()));
    }

    #[test]
    fn delivery_events_have_no_push_target() {
        let event = DomainEvent::DeliverySuccess {
            delivery_id: DeliveryId::new(),
            consumer: consumer(),
        };
        assert!(event.push_target().is_none());
    }

    #[test]
    fn payload_serializes_without_tag() {
        let event = DomainEvent::SubscriptionCancelled {
            generator: Address::from("0x1111111111111111111111111111111111111111"),
            consumer: consumer(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("generator").is_some());
        assert!(value.get("type").is_none());
    }

    #[test]
    fn payload_uses_camel_case_keys() {
        let event = DomainEvent::TradeExpired {
            confirmation_id: ConfirmationId::new(),
            broadcast_id: BroadcastId::new(),
            consumer: consumer(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("confirmationId").is_some());
        assert!(value.get("broadcastId").is_some());
    }
}
