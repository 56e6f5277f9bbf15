//! Database row types and their domain conversions.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that string comparison in SQL matches
//! chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;

use super::schema::{
    broadcasts, confirmations, consumers, deliveries, generators, strategies, subscriptions,
};
use crate::domain::account::{ConsumerAccount, GeneratorAccount};
use crate::domain::broadcast::TradeBroadcast;
use crate::domain::confirmation::{ConfirmationStatus, TradeConfirmation};
use crate::domain::delivery::{DeliveryRecord, DeliveryStatus};
use crate::domain::id::TxHash;
use crate::domain::strategy::Strategy;
use crate::domain::subscription::Subscription;
use crate::error::{Error, Result};

pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("bad timestamp '{raw}': {e}")))
}

fn fmt_opt_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(fmt_ts)
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = generators)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GeneratorRow {
    pub address: String,
    pub is_active: i32,
    pub registered_at: String,
    pub tx_hash: Option<String>,
}

impl GeneratorRow {
    pub fn from_domain(account: &GeneratorAccount) -> Self {
        Self {
            address: account.address.to_string(),
            is_active: i32::from(account.is_active),
            registered_at: fmt_ts(account.registered_at),
            tx_hash: account.tx_hash.as_ref().map(ToString::to_string),
        }
    }

    pub fn into_domain(self) -> Result<GeneratorAccount> {
        Ok(GeneratorAccount {
            address: self.address.into(),
            is_active: self.is_active != 0,
            registered_at: parse_ts(&self.registered_at)?,
            tx_hash: self.tx_hash.map(TxHash::from),
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = consumers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConsumerRow {
    pub address: String,
    pub encrypted_address: Option<String>,
    pub created_at: String,
}

impl ConsumerRow {
    pub fn from_domain(account: &ConsumerAccount) -> Self {
        Self {
            address: account.address.to_string(),
            encrypted_address: account.encrypted_address.clone(),
            created_at: fmt_ts(account.created_at),
        }
    }

    pub fn into_domain(self) -> Result<ConsumerAccount> {
        Ok(ConsumerAccount {
            address: self.address.into(),
            encrypted_address: self.encrypted_address,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = subscriptions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SubscriptionRow {
    pub id: String,
    pub generator_address: String,
    pub consumer_address: String,
    pub fee_amount: String,
    pub subscribed_at: String,
    pub expires_at: String,
    pub is_active: i32,
    pub encrypted_address: Option<String>,
    pub tx_hash: Option<String>,
}

impl SubscriptionRow {
    pub fn from_domain(sub: &Subscription) -> Self {
        Self {
            id: sub.id.to_string(),
            generator_address: sub.generator.to_string(),
            consumer_address: sub.consumer.to_string(),
            fee_amount: sub.fee_amount.clone(),
            subscribed_at: fmt_ts(sub.subscribed_at),
            expires_at: fmt_ts(sub.expires_at),
            is_active: i32::from(sub.is_active),
            encrypted_address: sub.encrypted_address.clone(),
            tx_hash: sub.tx_hash.as_ref().map(ToString::to_string),
        }
    }

    pub fn into_domain(self) -> Result<Subscription> {
        Ok(Subscription {
            id: self.id.into(),
            generator: self.generator_address.into(),
            consumer: self.consumer_address.into(),
            fee_amount: self.fee_amount,
            subscribed_at: parse_ts(&self.subscribed_at)?,
            expires_at: parse_ts(&self.expires_at)?,
            is_active: self.is_active != 0,
            encrypted_address: self.encrypted_address,
            tx_hash: self.tx_hash.map(TxHash::from),
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = strategies)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StrategyRow {
    pub id: String,
    pub generator_address: String,
    pub name: String,
    pub protocol: String,
    pub functions: String,
    pub is_active: i32,
    pub created_at: String,
}

impl StrategyRow {
    pub fn from_domain(strategy: &Strategy) -> Result<Self> {
        Ok(Self {
            id: strategy.id.to_string(),
            generator_address: strategy.generator.to_string(),
            name: strategy.name.clone(),
            protocol: strategy.protocol.clone(),
            functions: serde_json::to_string(&strategy.functions)?,
            is_active: i32::from(strategy.is_active),
            created_at: fmt_ts(strategy.created_at),
        })
    }

    pub fn into_domain(self) -> Result<Strategy> {
        Ok(Strategy {
            id: self.id.into(),
            generator: self.generator_address.into(),
            name: self.name,
            protocol: self.protocol,
            functions: serde_json::from_str(&self.functions)?,
            is_active: self.is_active != 0,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = broadcasts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BroadcastRow {
    pub id: String,
    pub strategy_id: Option<String>,
    pub generator_address: String,
    pub function_name: String,
    pub protocol: String,
    pub parameters: String,
    pub modifiable_params: String,
    pub contract_address: Option<String>,
    pub gas_limit: Option<i64>,
    pub total_cost: Option<String>,
    pub network: String,
    pub correlation_id: String,
    pub broadcast_at: String,
    pub expires_at: String,
}

impl BroadcastRow {
    pub fn from_domain(broadcast: &TradeBroadcast) -> Result<Self> {
        Ok(Self {
            id: broadcast.id.to_string(),
            strategy_id: broadcast.strategy_id.as_ref().map(ToString::to_string),
            generator_address: broadcast.generator.to_string(),
            function_name: broadcast.function_name.clone(),
            protocol: broadcast.protocol.clone(),
            parameters: serde_json::to_string(&broadcast.parameters)?,
            modifiable_params: serde_json::to_string(&broadcast.modifiable_params)?,
            contract_address: broadcast.contract_address.clone(),
            gas_limit: broadcast.gas_limit.map(|g| g as i64),
            total_cost: broadcast.total_cost.clone(),
            network: broadcast.network.clone(),
            correlation_id: broadcast.correlation_id.to_string(),
            broadcast_at: fmt_ts(broadcast.broadcast_at),
            expires_at: fmt_ts(broadcast.expires_at),
        })
    }

    pub fn into_domain(self) -> Result<TradeBroadcast> {
        Ok(TradeBroadcast {
            id: self.id.into(),
            strategy_id: self.strategy_id.map(Into::into),
            generator: self.generator_address.into(),
            function_name: self.function_name,
            protocol: self.protocol,
            parameters: serde_json::from_str(&self.parameters)?,
            modifiable_params: serde_json::from_str(&self.modifiable_params)?,
            contract_address: self.contract_address,
            gas_limit: self.gas_limit.map(|g| g as u64),
            total_cost: self.total_cost,
            network: self.network,
            correlation_id: self.correlation_id.into(),
            broadcast_at: parse_ts(&self.broadcast_at)?,
            expires_at: parse_ts(&self.expires_at)?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = confirmations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConfirmationRow {
    pub id: String,
    pub broadcast_id: String,
    pub consumer_address: String,
    pub original_parameters: String,
    pub modified_parameters: String,
    pub status: String,
    pub gas_price: Option<String>,
    pub transaction_hash: Option<String>,
    pub gas_used: Option<i64>,
    pub error_message: Option<String>,
    pub received_at: String,
    pub decided_at: Option<String>,
    pub executed_at: Option<String>,
}

impl ConfirmationRow {
    pub fn from_domain(confirmation: &TradeConfirmation) -> Result<Self> {
        Ok(Self {
            id: confirmation.id.to_string(),
            broadcast_id: confirmation.broadcast_id.to_string(),
            consumer_address: confirmation.consumer.to_string(),
            original_parameters: serde_json::to_string(&confirmation.original_parameters)?,
            modified_parameters: serde_json::to_string(&confirmation.modified_parameters)?,
            status: confirmation.status.as_str().to_string(),
            gas_price: confirmation.gas_price.clone(),
            transaction_hash: confirmation.transaction_hash.as_ref().map(ToString::to_string),
            gas_used: confirmation.gas_used.map(|g| g as i64),
            error_message: confirmation.error_message.clone(),
            received_at: fmt_ts(confirmation.received_at),
            decided_at: fmt_opt_ts(confirmation.decided_at),
            executed_at: fmt_opt_ts(confirmation.executed_at),
        })
    }

    pub fn into_domain(self) -> Result<TradeConfirmation> {
        let status = ConfirmationStatus::parse(&self.status)
            .ok_or_else(|| Error::Parse(format!("unknown confirmation status '{}'", self.status)))?;
        Ok(TradeConfirmation {
            id: self.id.into(),
            broadcast_id: self.broadcast_id.into(),
            consumer: self.consumer_address.into(),
            original_parameters: serde_json::from_str(&self.original_parameters)?,
            modified_parameters: serde_json::from_str(&self.modified_parameters)?,
            status,
            gas_price: self.gas_price,
            transaction_hash: self.transaction_hash.map(TxHash::from),
            gas_used: self.gas_used.map(|g| g as u64),
            error_message: self.error_message,
            received_at: parse_ts(&self.received_at)?,
            decided_at: parse_opt_ts(self.decided_at)?,
            executed_at: parse_opt_ts(self.executed_at)?,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = deliveries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeliveryRow {
    pub id: String,
    pub broadcast_id: Option<String>,
    pub strategy_id: Option<String>,
    pub consumer_address: String,
    pub event_name: String,
    pub payload: String,
    pub status: String,
    pub retry_count: i32,
    pub queued_at: String,
    pub last_attempt_at: Option<String>,
    pub delivered_at: Option<String>,
}

impl DeliveryRow {
    pub fn from_domain(record: &DeliveryRecord) -> Result<Self> {
        Ok(Self {
            id: record.id.to_string(),
            broadcast_id: record.broadcast_id.as_ref().map(ToString::to_string),
            strategy_id: record.strategy_id.as_ref().map(ToString::to_string),
            consumer_address: record.consumer.to_string(),
            event_name: record.event_name.clone(),
            payload: serde_json::to_string(&record.payload)?,
            status: record.status.as_str().to_string(),
            retry_count: record.retry_count,
            queued_at: fmt_ts(record.queued_at),
            last_attempt_at: fmt_opt_ts(record.last_attempt_at),
            delivered_at: fmt_opt_ts(record.delivered_at),
        })
    }

    pub fn into_domain(self) -> Result<DeliveryRecord> {
        let status = DeliveryStatus::parse(&self.status)
            .ok_or_else(|| Error::Parse(format!("unknown delivery status '{}'", self.status)))?;
        Ok(DeliveryRecord {
            id: self.id.into(),
            broadcast_id: self.broadcast_id.map(Into::into),
            strategy_id: self.strategy_id.map(Into::into),
            consumer: self.consumer_address.into(),
            event_name: self.event_name,
            payload: serde_json::from_str(&self.payload)?,
            status,
            retry_count: self.retry_count,
            queued_at: parse_ts(&self.queued_at)?,
            last_attempt_at: parse_opt_ts(self.last_attempt_at)?,
            delivered_at: parse_opt_ts(self.delivered_at)?,
        })
    }
}
