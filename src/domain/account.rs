//! Generator and consumer account records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{Address, TxHash};

/// A registered signal publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorAccount {
    pub address: Address,
    pub is_active: bool,
    pub registered_at: DateTime<Utc>,
    pub tx_hash: Option<TxHash>,
}

impl GeneratorAccount {
    #[must_use]
    pub fn new(address: Address, now: DateTime<Utc>) -> Self {
        Self {
            address,
            is_active: true,
            registered_at: now,
            tx_hash: None,
        }
    }

    #[must_use]
    pub fn with_tx_hash(mut self, tx_hash: TxHash) -> Self {
        self.tx_hash = Some(tx_hash);
        self
    }
}

/// A subscriber-side account, created lazily the first time an address
/// subscribes or receives a confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerAccount {
    pub address: Address,
    /// Opaque ciphertext from the privacy service; persisted as-is.
    pub encrypted_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConsumerAccount {
    #[must_use]
    pub fn new(address: Address, now: DateTime<Utc>) -> Self {
        Self {
            address,
            encrypted_address: None,
            created_at: now,
        }
    }
}
