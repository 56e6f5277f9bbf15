//! Domain identifier types with proper encapsulation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// EVM account address - newtype for type safety.
///
/// Stored lowercased so equality and database lookups are case-insensitive.
/// [`Address::parse`] validates the `0x` + 40 hex digit shape; the `From`
/// conversions only normalize and are meant for values already persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Parse and validate an address string.
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let hex_part = value.strip_prefix("0x").unwrap_or(&value);
        if value.len() != 42 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidAddress { value });
        }
        Ok(Self(value.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s.to_lowercase())
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_lowercase())
    }
}

/// Transaction hash used as the chain-event dedupe key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TxHash {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TxHash {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Create a new id with a generated UUID.
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a subscription row.
    SubscriptionId
);

uuid_id!(
    /// Unique identifier for a strategy.
    StrategyId
);

uuid_id!(
    /// Unique identifier for a trade broadcast.
    BroadcastId
);

uuid_id!(
    /// Unique identifier for a per-subscriber trade confirmation.
    ConfirmationId
);

uuid_id!(
    /// Correlation id tying one broadcast to all of its confirmations.
    ///
    /// Globally unique; a duplicate on insert means a retried client request
    /// and is rejected, giving at-most-once broadcast semantics.
    CorrelationId
);

uuid_id!(
    /// Unique identifier for a delivery record.
    DeliveryId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parse_accepts_checksummed_input() {
        let addr = Address::parse("0xAbCd000000000000000000000000000000001234").unwrap();
        assert_eq!(addr.as_str(), "0xabcd000000000000000000000000000000001234");
    }

    #[test]
    fn address_parse_rejects_short_input() {
        assert!(Address::parse("0x1234").is_err());
    }

    #[test]
    fn address_parse_rejects_non_hex() {
        assert!(Address::parse("0xzzzz000000000000000000000000000000001234").is_err());
    }

    #[test]
    fn address_from_str_normalizes_case() {
        let a = Address::from("0xABCD000000000000000000000000000000001234");
        let b = Address::from("0xabcd000000000000000000000000000000001234");
        assert_eq!(a, b);
    }

    #[test]
    fn tx_hash_normalizes_case() {
        let h = TxHash::new("0xDEADBEEF");
        assert_eq!(h.as_str(), "0xdeadbeef");
    }

    #[test]
    fn broadcast_id_generates_unique_ids() {
        assert_ne!(BroadcastId::new(), BroadcastId::new());
    }

    #[test]
    fn correlation_id_is_uuid_shaped() {
        let id = CorrelationId::new();
        assert_eq!(id.as_str().len(), 36);
        assert_eq!(id.as_str().chars().filter(|c| *c == '-').count(), 4);
    }
}
