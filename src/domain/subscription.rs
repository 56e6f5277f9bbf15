//! Subscription records and the 30-day term invariant.

use alloy_primitives::U256;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::id::{Address, SubscriptionId, TxHash};
use crate::error::ValidationError;

/// Fixed subscription term. `expires_at` is always exactly this far past
/// `subscribed_at`.
pub const SUBSCRIPTION_TERM_DAYS: i64 = 30;

/// A paid, time-boxed subscription from a consumer to a generator.
///
/// Rows are never hard-deleted; expiry and cancellation only flip
/// `is_active`. At most one row per (generator, consumer) pair may be active
/// at any instant, enforced by a partial unique index in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub generator: Address,
    pub consumer: Address,
    /// Fee paid, in wei, as a decimal string.
    pub fee_amount: String,
    pub subscribed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    /// Opaque ciphertext of the consumer address; never interpreted here.
    pub encrypted_address: Option<String>,
    /// On-chain transaction that created the subscription, when applicable.
    pub tx_hash: Option<TxHash>,
}

impl Subscription {
    /// Create a new active subscription starting at `now`.
    pub fn new(
        generator: Address,
        consumer: Address,
        fee_amount: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let fee_amount = fee_amount.into();
        parse_wei(&fee_amount)?;
        Ok(Self {
            id: SubscriptionId::new(),
            generator,
            consumer,
            fee_amount,
            subscribed_at: now,
            expires_at: now + Duration::days(SUBSCRIPTION_TERM_DAYS),
            is_active: true,
            encrypted_address: None,
            tx_hash: None,
        })
    }

    #[must_use]
    pub fn with_encrypted_address(mut self, encrypted: impl Into<String>) -> Self {
        self.encrypted_address = Some(encrypted.into());
        self
    }

    #[must_use]
    pub fn with_tx_hash(mut self, tx_hash: TxHash) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    /// Fee as a big integer. Never goes through floating point.
    pub fn fee_wei(&self) -> Result<U256, ValidationError> {
        parse_wei(&self.fee_amount)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Active flag set and term not yet elapsed.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

/// Parse a decimal wei string into a [`U256`].
pub fn parse_wei(value: &str) -> Result<U256, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::InvalidAmount {
            value: value.to_string(),
        });
    }
    U256::from_str_radix(value, 10).map_err(|_| ValidationError::InvalidAmount {
        value: value.to_string(),
    })
}
