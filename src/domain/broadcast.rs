//! Trade broadcasts: one strategy-execution event fanned out to all
//! subscribers at that moment. Immutable after creation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::{Address, BroadcastId, CorrelationId, StrategyId};
use crate::error::ValidationError;

pub const MIN_EXPIRY_MINUTES: i64 = 1;
pub const MAX_EXPIRY_MINUTES: i64 = 60;

/// Confirmation window for a broadcast, in whole minutes, validated to the
/// 1-60 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryWindow(i64);

impl ExpiryWindow {
    pub fn try_new(minutes: i64) -> Result<Self, ValidationError> {
        if !(MIN_EXPIRY_MINUTES..=MAX_EXPIRY_MINUTES).contains(&minutes) {
            return Err(ValidationError::InvalidExpiryWindow {
                minutes,
                min: MIN_EXPIRY_MINUTES,
                max: MAX_EXPIRY_MINUTES,
            });
        }
        Ok(Self(minutes))
    }

    #[must_use]
    pub fn minutes(&self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::minutes(self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeBroadcast {
    pub id: BroadcastId,
    pub strategy_id: Option<StrategyId>,
    pub generator: Address,
    pub function_name: String,
    pub protocol: String,
    /// JSON object of function parameters as authored by the generator.
    pub parameters: Value,
    /// Whitelist snapshot resolved at creation time; confirmation edits are
    /// validated against this, not against live strategy state.
    pub modifiable_params: Vec<String>,
    pub contract_address: Option<String>,
    pub gas_limit: Option<u64>,
    /// Estimated total cost in wei, as a decimal string.
    pub total_cost: Option<String>,
    pub network: String,
    pub correlation_id: CorrelationId,
    pub broadcast_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TradeBroadcast {
    /// Create a broadcast with a fresh id and correlation id. Gas fields are
    /// filled in later by the broadcast engine.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        strategy_id: Option<StrategyId>,
        generator: Address,
        function_name: &str,
        protocol: &str,
        parameters: Value,
        modifiable_params: Vec<String>,
        network: &str,
        window: ExpiryWindow,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BroadcastId::new(),
            strategy_id,
            generator,
            function_name: function_name.to_string(),
            protocol: protocol.to_string(),
            parameters,
            modifiable_params,
            contract_address: None,
            gas_limit: None,
            total_cost: None,
            network: network.to_string(),
            correlation_id: CorrelationId::new(),
            broadcast_at: now,
            expires_at: now + window.as_duration(),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// True when the broadcast expires within `window` from `now` but has
    /// not expired yet. Drives consumer-facing expiry warnings.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.is_expired(now) && self.expires_at <= now + window
    }

    /// Check that a key is allowed to be edited by consumers.
    #[must_use]
    pub fn is_modifiable(&self, key: &str) -> bool {
        self.modifiable_params.iter().any(|p| p == key)
    }
}
