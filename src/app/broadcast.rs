//! Trade broadcast engine: fan-out of one generator action into pending
//! confirmations for every live subscriber.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::BroadcastConfig;
use crate::domain::account::ConsumerAccount;
use crate::domain::broadcast::{ExpiryWindow, TradeBroadcast};
use crate::domain::confirmation::TradeConfirmation;
use crate::domain::event::DomainEvent;
use crate::domain::id::{Address, CorrelationId, StrategyId};
use crate::domain::strategy::DEFAULT_MODIFIABLE_PARAMS;
use crate::error::{Error, Result, ValidationError};
use crate::port::executor::{GasEstimate, ProtocolExecutor};
use crate::port::store::{AccountStore, BroadcastStore, StrategyStore, SubscriptionStore};

use super::dispatcher::EventDispatcher;

#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub generator: Address,
    pub strategy_id: Option<StrategyId>,
    pub function_name: String,
    /// Required when no strategy is given; otherwise taken from the strategy.
    pub protocol: Option<String>,
    pub parameters: Value,
    pub contract_address: Option<String>,
    /// Confirmation window in minutes; the configured default when absent.
    pub expiry_minutes: Option<i64>,
    pub network: Option<String>,
    /// Client-supplied idempotency key; generated when absent.
    pub correlation_id: Option<CorrelationId>,
}

/// Result of a broadcast: nothing is persisted when there are no live
/// subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastOutcome {
    pub broadcast: Option<TradeBroadcast>,
    pub confirmations: Vec<TradeConfirmation>,
}

pub struct BroadcastEngine<S> {
    store: Arc<S>,
    executor: Arc<dyn ProtocolExecutor>,
    dispatcher: EventDispatcher,
    config: BroadcastConfig,
}

impl<S> BroadcastEngine<S>
where
    S: AccountStore + SubscriptionStore + StrategyStore + BroadcastStore,
{
    pub fn new(
        store: Arc<S>,
        executor: Arc<dyn ProtocolExecutor>,
        dispatcher: EventDispatcher,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            store,
            executor,
            dispatcher,
            config,
        }
    }

    pub async fn broadcast_trade(&self, request: BroadcastRequest) -> Result<BroadcastOutcome> {
        let now = Utc::now();

        let generator = self
            .store
            .get_generator(&request.generator)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| Error::not_found("generator", request.generator.as_str()))?;

        let subscribers = self.store.subscribers_of(&generator.address, now).await?;
        if subscribers.is_empty() {
            info!(generator = %generator.address, "Broadcast with no live subscribers, nothing persisted");
            return Ok(BroadcastOutcome {
                broadcast: None,
                confirmations: Vec::new(),
            });
        }

        let (protocol, modifiable_params) = self.resolve_whitelist(&request).await?;

        let window = ExpiryWindow::try_new(
            request
                .expiry_minutes
                .unwrap_or(self.config.default_expiry_minutes),
        )?;
        let network = request
            .network
            .clone()
            .unwrap_or_else(|| "mainnet".to_string());

        let mut broadcast = TradeBroadcast::new(
            request.strategy_id.clone(),
            generator.address.clone(),
            &request.function_name,
            &protocol,
            request.parameters.clone(),
            modifiable_params,
            &network,
            window,
            now,
        );
        broadcast.contract_address = request.contract_address.clone();
        if let Some(correlation_id) = request.correlation_id.clone() {
            broadcast.correlation_id = correlation_id;
        }

        let estimate = self.estimate_gas_with_fallback(&broadcast).await;
        broadcast.gas_limit = Some(estimate.gas_limit);
        broadcast.total_cost = Some(estimate.total_cost);

        // Every confirmation is backed by a consumer record; subscribers
        // seeded before their first confirmation get one here. The upsert
        // keeps any encrypted address already on file.
        for sub in &subscribers {
            self.store
                .upsert_consumer(&ConsumerAccount {
                    address: sub.consumer.clone(),
                    encrypted_address: sub.encrypted_address.clone(),
                    created_at: now,
                })
                .await?;
        }

        let confirmations: Vec<TradeConfirmation> = subscribers
            .iter()
            .map(|sub| TradeConfirmation::new_pending(&broadcast, sub.consumer.clone(), now))
            .collect();

        self.store
            .create_with_confirmations(&broadcast, &confirmations)
            .await?;

        info!(
            broadcast_id = %broadcast.id,
            correlation_id = %broadcast.correlation_id,
            generator = %broadcast.generator,
            function = %broadcast.function_name,
            subscribers = confirmations.len(),
            expires_at = %broadcast.expires_at,
            "Trade broadcast"
        );

        for confirmation in &confirmations {
            self.dispatcher.publish(DomainEvent::TradeCreated {
                confirmation_id: confirmation.id.clone(),
                broadcast_id: broadcast.id.clone(),
                correlation_id: broadcast.correlation_id.clone(),
                generator: broadcast.generator.clone(),
                consumer: confirmation.consumer.clone(),
                function_name: broadcast.function_name.clone(),
                protocol: broadcast.protocol.clone(),
                parameters: broadcast.parameters.clone(),
                expires_at: broadcast.expires_at,
            });
        }

        Ok(BroadcastOutcome {
            broadcast: Some(broadcast),
            confirmations,
        })
    }

    /// Resolve the protocol and modifiable-parameter whitelist, validating
    /// required parameters when a strategy function is involved.
    async fn resolve_whitelist(&self, request: &BroadcastRequest) -> Result<(String, Vec<String>)> {
        let params_object = request
            .parameters
            .as_object()
            .ok_or(ValidationError::ParametersNotObject)?;

        match &request.strategy_id {
            Some(strategy_id) => {
                let strategy = self
                    .store
                    .get_strategy(strategy_id)
                    .await?
                    .ok_or_else(|| Error::not_found("strategy", strategy_id.as_str()))?;
                let function = strategy.function(&request.function_name)?;

                for required in &function.required_params {
                    if !params_object.contains_key(required) {
                        return Err(ValidationError::MissingParameter {
                            name: required.clone(),
                        }
                        .into());
                    }
                }
                Ok((strategy.protocol.clone(), function.modifiable_params.clone()))
            }
            None => {
                let protocol = request.protocol.clone().ok_or(
                    ValidationError::MissingParameter {
                        name: "protocol".to_string(),
                    },
                )?;
                let whitelist = DEFAULT_MODIFIABLE_PARAMS
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                Ok((protocol, whitelist))
            }
        }
    }

    /// Gas estimation under a budget. A slow or failing executor falls back
    /// to the configured estimate instead of blocking broadcast creation.
    async fn estimate_gas_with_fallback(&self, broadcast: &TradeBroadcast) -> GasEstimate {
        let budget = Duration::from_millis(self.config.gas_estimate_timeout_ms);
        let estimate = tokio::time::timeout(
            budget,
            self.executor.estimate_gas(
                &broadcast.protocol,
                &broadcast.function_name,
                &broadcast.parameters,
                &broadcast.network,
            ),
        )
        .await;

        match estimate {
            Ok(Ok(estimate)) => estimate,
            Ok(Err(e)) => {
                warn!(error = %e, "Gas estimation failed, using fallback");
                self.fallback_estimate()
            }
            Err(_) => {
                warn!(budget_ms = self.config.gas_estimate_timeout_ms, "Gas estimation timed out, using fallback");
                self.fallback_estimate()
            }
        }
    }

    fn fallback_estimate(&self) -> GasEstimate {
        GasEstimate {
            gas_limit: self.config.fallback_gas_limit,
            total_cost: crate::adapter::executor::total_cost_wei(
                self.config.fallback_gas_limit,
                self.config.fallback_gas_price_wei,
            ),
        }
    }
}
