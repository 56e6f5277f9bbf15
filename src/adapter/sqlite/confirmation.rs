//! Confirmation persistence. Every state transition is a filtered UPDATE so
//! the status check and the write are one atomic statement.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use super::model::{fmt_ts, ConfirmationRow};
use super::schema::confirmations;
use super::SqliteStore;
use crate::domain::confirmation::{ConfirmationStatus, TradeConfirmation};
use crate::domain::id::{BroadcastId, ConfirmationId, TxHash};
use crate::error::{Error, Result};
use crate::port::store::ConfirmationStore;

impl ConfirmationStore for SqliteStore {
    async fn get_confirmation(&self, id: &ConfirmationId) -> Result<Option<TradeConfirmation>> {
        let mut conn = self.conn()?;

        let row: Option<ConfirmationRow> = confirmations::table
            .find(id.to_string())
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(ConfirmationRow::into_domain).transpose()
    }

    async fn confirmations_for_broadcast(
        &self,
        broadcast_id: &BroadcastId,
    ) -> Result<Vec<TradeConfirmation>> {
        let mut conn = self.conn()?;

        let rows: Vec<ConfirmationRow> = confirmations::table
            .filter(confirmations::broadcast_id.eq(broadcast_id.as_str()))
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(ConfirmationRow::into_domain).collect()
    }

    async fn pending_for_broadcast(
        &self,
        broadcast_id: &BroadcastId,
    ) -> Result<Vec<TradeConfirmation>> {
        let mut conn = self.conn()?;

        let rows: Vec<ConfirmationRow> = confirmations::table
            .filter(confirmations::broadcast_id.eq(broadcast_id.as_str()))
            .filter(confirmations::status.eq(ConfirmationStatus::Pending.as_str()))
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(ConfirmationRow::into_domain).collect()
    }

    async fn record_decision(
        &self,
        id: &ConfirmationId,
        status: ConfirmationStatus,
        modified_parameters: &Value,
        decided_at: DateTime<Utc>,
    ) -> Result<bool> {
        let params = serde_json::to_string(modified_parameters)?;
        let mut conn = self.conn()?;

        let updated = diesel::update(
            confirmations::table
                .filter(confirmations::id.eq(id.as_str()))
                .filter(confirmations::status.eq(ConfirmationStatus::Pending.as_str())),
        )
        .set((
            confirmations::status.eq(status.as_str()),
            confirmations::modified_parameters.eq(params),
            confirmations::decided_at.eq(fmt_ts(decided_at)),
        ))
        .execute(&mut conn)
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(updated > 0)
    }

    async fn begin_execution(&self, id: &ConfirmationId) -> Result<bool> {
        let mut conn = self.conn()?;

        let updated = diesel::update(
            confirmations::table
                .filter(confirmations::id.eq(id.as_str()))
                .filter(confirmations::status.eq(ConfirmationStatus::Accepted.as_str())),
        )
        .set(confirmations::status.eq(ConfirmationStatus::Executing.as_str()))
        .execute(&mut conn)
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(updated > 0)
    }

    async fn record_execution_success(
        &self,
        id: &ConfirmationId,
        tx_hash: &TxHash,
        gas_used: u64,
        gas_price: Option<&str>,
        executed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn()?;

        let updated = diesel::update(
            confirmations::table
                .filter(confirmations::id.eq(id.as_str()))
                .filter(confirmations::status.eq(ConfirmationStatus::Executing.as_str())),
        )
        .set((
            confirmations::status.eq(ConfirmationStatus::Executed.as_str()),
            confirmations::transaction_hash.eq(tx_hash.as_str()),
            confirmations::gas_used.eq(gas_used as i64),
            confirmations::gas_price.eq(gas_price),
            confirmations::executed_at.eq(fmt_ts(executed_at)),
        ))
        .execute(&mut conn)
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(updated > 0)
    }

    async fn record_execution_failure(
        &self,
        id: &ConfirmationId,
        error_message: &str,
        executed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn()?;

        let updated = diesel::update(
            confirmations::table
                .filter(confirmations::id.eq(id.as_str()))
                .filter(confirmations::status.eq(ConfirmationStatus::Executing.as_str())),
        )
        .set((
            confirmations::status.eq(ConfirmationStatus::Failed.as_str()),
            confirmations::error_message.eq(error_message),
            confirmations::executed_at.eq(fmt_ts(executed_at)),
        ))
        .execute(&mut conn)
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(updated > 0)
    }

    async fn expire_pending(
        &self,
        broadcast_id: &BroadcastId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradeConfirmation>> {
        let mut conn = self.conn()?;

        conn.transaction(|conn| {
            let pending: Vec<String> = confirmations::table
                .select(confirmations::id)
                .filter(confirmations::broadcast_id.eq(broadcast_id.as_str()))
                .filter(confirmations::status.eq(ConfirmationStatus::Pending.as_str()))
                .load(&mut *conn)?;

            if pending.is_empty() {
                return Ok(Vec::new());
            }

            diesel::update(confirmations::table.filter(confirmations::id.eq_any(&pending)))
                .set((
                    confirmations::status.eq(ConfirmationStatus::Expired.as_str()),
                    confirmations::decided_at.eq(fmt_ts(now)),
                ))
                .execute(&mut *conn)?;

            confirmations::table
                .filter(confirmations::id.eq_any(&pending))
                .load::<ConfirmationRow>(&mut *conn)
        })
        .map_err(|e: diesel::result::Error| Error::Database(e.to_string()))?
        .into_iter()
        .map(ConfirmationRow::into_domain)
        .collect()
    }
}
