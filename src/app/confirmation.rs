//! Confirmation service: consumer decisions and trade execution over the
//! confirmation state machine.
//!
//! Every transition goes through a compare-and-set in the store, so two
//! racing writers cannot both win; the loser sees a `Conflict`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::confirmation::{ConfirmationStatus, Decision, TradeConfirmation};
use crate::domain::id::{Address, ConfirmationId};
use crate::error::{Error, Result, ValidationError};
use crate::port::executor::{ExecutionRequest, GasEstimate, ProtocolExecutor};
use crate::port::store::{BroadcastStore, ConfirmationStore};

/// One item of a batch decision request.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub confirmation_id: ConfirmationId,
    pub decision: Decision,
    pub modified_parameters: Option<Value>,
}

/// Per-item outcome of a batch request; items succeed and fail
/// independently.
pub struct BatchOutcome {
    pub confirmation_id: ConfirmationId,
    pub result: Result<TradeConfirmation>,
}

/// Result of [`ConfirmationService::execute_trade`].
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Simulate mode: the gas estimate, with no state transition.
    Simulated(GasEstimate),
    /// The confirmation after execution, `executed` or `failed`.
    Completed(TradeConfirmation),
}

pub struct ConfirmationService<S> {
    store: Arc<S>,
    executor: Arc<dyn ProtocolExecutor>,
}

impl<S> ConfirmationService<S>
where
    S: ConfirmationStore + BroadcastStore,
{
    pub fn new(store: Arc<S>, executor: Arc<dyn ProtocolExecutor>) -> Self {
        Self { store, executor }
    }

    /// Accept or reject a pending confirmation, optionally with edited
    /// parameters. The first decision wins; later attempts conflict.
    pub async fn update_confirmation(
        &self,
        id: &ConfirmationId,
        decision: Decision,
        modified_parameters: Option<Value>,
        consumer: &Address,
    ) -> Result<TradeConfirmation> {
        let confirmation = self.load_owned(id, consumer).await?;

        let broadcast = self
            .store
            .get_broadcast(&confirmation.broadcast_id)
            .await?
            .ok_or_else(|| Error::not_found("broadcast", confirmation.broadcast_id.as_str()))?;
        if broadcast.is_expired(Utc::now()) {
            return Err(Error::Expired(format!(
                "broadcast {} expired at {}",
                broadcast.id, broadcast.expires_at
            )));
        }

        let final_parameters = match modified_parameters {
            Some(edited) => {
                validate_edits(&confirmation.original_parameters, &edited, &broadcast)?;
                edited
            }
            None => confirmation.modified_parameters.clone(),
        };

        let won = self
            .store
            .record_decision(id, decision.status(), &final_parameters, Utc::now())
            .await?;
        if !won {
            return Err(Error::Conflict(format!(
                "confirmation {id} is not in PENDING status"
            )));
        }

        let updated = self
            .store
            .get_confirmation(id)
            .await?
            .ok_or_else(|| Error::not_found("confirmation", id.as_str()))?;
        info!(
            confirmation_id = %id,
            consumer = %consumer,
            status = %updated.status,
            "Confirmation decided"
        );
        Ok(updated)
    }

    /// Execute an accepted trade, or estimate it in simulate mode.
    pub async fn execute_trade(
        &self,
        id: &ConfirmationId,
        consumer: &Address,
        simulate: bool,
    ) -> Result<ExecutionOutcome> {
        let confirmation = self.load_owned(id, consumer).await?;
        if confirmation.status != ConfirmationStatus::Accepted {
            return Err(Error::Conflict(format!(
                "confirmation {id} is not in ACCEPTED status"
            )));
        }

        let broadcast = self
            .store
            .get_broadcast(&confirmation.broadcast_id)
            .await?
            .ok_or_else(|| Error::not_found("broadcast", confirmation.broadcast_id.as_str()))?;

        if simulate {
            let estimate = self
                .executor
                .estimate_gas(
                    &broadcast.protocol,
                    &broadcast.function_name,
                    &confirmation.modified_parameters,
                    &broadcast.network,
                )
                .await?;
            return Ok(ExecutionOutcome::Simulated(estimate));
        }

        if !self.store.begin_execution(id).await? {
            return Err(Error::Conflict(format!(
                "confirmation {id} is not in ACCEPTED status"
            )));
        }

        let request = ExecutionRequest {
            protocol: broadcast.protocol.clone(),
            function_name: broadcast.function_name.clone(),
            parameters: confirmation.modified_parameters.clone(),
            network: broadcast.network.clone(),
            contract_address: broadcast.contract_address.clone(),
            consumer: consumer.clone(),
        };
        match self.executor.execute(&request).await {
            Ok(receipt) => {
                self.store
                    .record_execution_success(
                        id,
                        &receipt.transaction_hash,
                        receipt.gas_used,
                        receipt.gas_price.as_deref(),
                        Utc::now(),
                    )
                    .await?;
                info!(
                    confirmation_id = %id,
                    tx_hash = %receipt.transaction_hash,
                    gas_used = receipt.gas_used,
                    "Trade executed"
                );
            }
            Err(e) => {
                self.store
                    .record_execution_failure(id, &e.to_string(), Utc::now())
                    .await?;
                warn!(confirmation_id = %id, error = %e, "Trade execution failed");
            }
        }

        let updated = self
            .store
            .get_confirmation(id)
            .await?
            .ok_or_else(|| Error::not_found("confirmation", id.as_str()))?;
        Ok(ExecutionOutcome::Completed(updated))
    }

    /// Apply a batch of decisions; each item succeeds or fails on its own.
    pub async fn update_batch(
        &self,
        items: Vec<BatchItem>,
        consumer: &Address,
    ) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let result = self
                .update_confirmation(
                    &item.confirmation_id,
                    item.decision,
                    item.modified_parameters,
                    consumer,
                )
                .await;
            outcomes.push(BatchOutcome {
                confirmation_id: item.confirmation_id,
                result,
            });
        }
        outcomes
    }

    async fn load_owned(
        &self,
        id: &ConfirmationId,
        consumer: &Address,
    ) -> Result<TradeConfirmation> {
        let confirmation = self
            .store
            .get_confirmation(id)
            .await?
            .ok_or_else(|| Error::not_found("confirmation", id.as_str()))?;
        if !confirmation.belongs_to(consumer) {
            return Err(Error::Authorization(format!(
                "confirmation {id} does not belong to {consumer}"
            )));
        }
        Ok(confirmation)
    }
}

/// Reject edits touching keys outside the broadcast's whitelist. Checked in
/// full before any write, so a bad batch applies nothing.
fn validate_edits(
    original: &Value,
    edited: &Value,
    broadcast: &crate::domain::broadcast::TradeBroadcast,
) -> Result<()> {
    let edited_object = edited
        .as_object()
        .ok_or(ValidationError::ParametersNotObject)?;
    let original_object = original
        .as_object()
        .ok_or(ValidationError::ParametersNotObject)?;

    for (key, value) in edited_object {
        let unchanged = original_object.get(key) == Some(value);
        if !unchanged && !broadcast.is_modifiable(key) {
            return Err(ValidationError::DisallowedParameter {
                key: key.clone(),
                function: broadcast.function_name.clone(),
            }
            .into());
        }
    }
    for key in original_object.keys() {
        if !edited_object.contains_key(key) && !broadcast.is_modifiable(key) {
            return Err(ValidationError::MissingParameter { name: key.clone() }.into());
        }
    }
    Ok(())
}
