//! Per-subscriber confirmation records and their state machine.
//!
//! States: `pending -> {accepted, rejected}`, `accepted -> executing ->
//! {executed, failed}`, and `pending -> expired` when the parent broadcast's
//! window elapses. `rejected`, `executed`, `failed`, and `expired` are
//! terminal. Expiry-by-timeout is kept distinct from failure-by-execution so
//! the two are distinguishable after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::broadcast::TradeBroadcast;
use super::id::{Address, BroadcastId, ConfirmationId, TxHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    Pending,
    Accepted,
    Rejected,
    Executing,
    Executed,
    Failed,
    Expired,
}

impl ConfirmationStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "executing" => Some(Self::Executing),
            "executed" => Some(Self::Executed),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Executed | Self::Failed | Self::Expired
        )
    }

    /// Whether the state machine permits `self -> next`.
    #[must_use]
    pub fn can_transition_to(&self, next: ConfirmationStatus) -> bool {
        use ConfirmationStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Expired)
                | (Accepted, Executing)
                | (Executing, Executed)
                | (Executing, Failed)
        )
    }
}

impl std::fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A consumer's accept/reject choice for a pending confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    #[must_use]
    pub fn status(&self) -> ConfirmationStatus {
        match self {
            Self::Accept => ConfirmationStatus::Accepted,
            Self::Reject => ConfirmationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfirmation {
    pub id: ConfirmationId,
    pub broadcast_id: BroadcastId,
    pub consumer: Address,
    /// Immutable snapshot of the broadcast parameters at creation.
    pub original_parameters: Value,
    /// Consumer-editable copy; only whitelisted keys may diverge from the
    /// original.
    pub modified_parameters: Value,
    pub status: ConfirmationStatus,
    pub gas_price: Option<String>,
    pub transaction_hash: Option<TxHash>,
    pub gas_used: Option<u64>,
    pub error_message: Option<String>,
    pub received_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl TradeConfirmation {
    /// Create the pending confirmation a broadcast fans out to one
    /// subscriber. Original and modified parameters start identical.
    #[must_use]
    pub fn new_pending(
        broadcast: &TradeBroadcast,
        consumer: Address,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConfirmationId::new(),
            broadcast_id: broadcast.id.clone(),
            consumer,
            original_parameters: broadcast.parameters.clone(),
            modified_parameters: broadcast.parameters.clone(),
            status: ConfirmationStatus::Pending,
            gas_price: None,
            transaction_hash: None,
            gas_used: None,
            error_message: None,
            received_at: now,
            decided_at: None,
            executed_at: None,
        }
    }

    #[must_use]
    pub fn belongs_to(&self, consumer: &Address) -> bool {
        &self.consumer == consumer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConfirmationStatus::*;

    #[test]
    fn pending_can_be_decided_or_expired() {
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Expired));
        assert!(!Pending.can_transition_to(Executing));
        assert!(!Pending.can_transition_to(Executed));
    }

    #[test]
    fn only_accepted_can_start_executing() {
        assert!(Accepted.can_transition_to(Executing));
        assert!(!Rejected.can_transition_to(Executing));
        assert!(!Expired.can_transition_to(Executing));
    }

    #[test]
    fn executing_resolves_to_executed_or_failed() {
        assert!(Executing.can_transition_to(Executed));
        assert!(Executing.can_transition_to(Failed));
        assert!(!Executing.can_transition_to(Accepted));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [Rejected, Executed, Failed, Expired] {
            assert!(terminal.is_terminal());
            for next in [Pending, Accepted, Rejected, Executing, Executed, Failed, Expired] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [Pending, Accepted, Rejected, Executing, Executed, Failed, Expired] {
            assert_eq!(ConfirmationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ConfirmationStatus::parse("cancelled"), None);
    }

    #[test]
    fn decision_maps_to_status() {
        assert_eq!(Decision::Accept.status(), Accepted);
        assert_eq!(Decision::Reject.status(), Rejected);
    }
}
