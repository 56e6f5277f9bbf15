use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;

use super::model::{fmt_ts, BroadcastRow, ConfirmationRow};
use super::schema::{broadcasts, confirmations};
use super::{map_db_err, SqliteStore};
use crate::domain::broadcast::TradeBroadcast;
use crate::domain::confirmation::{ConfirmationStatus, TradeConfirmation};
use crate::domain::id::{Address, BroadcastId};
use crate::error::{Error, Result};
use crate::port::store::BroadcastStore;

impl BroadcastStore for SqliteStore {
    async fn create_with_confirmations(
        &self,
        broadcast: &TradeBroadcast,
        fanout: &[TradeConfirmation],
    ) -> Result<()> {
        let broadcast_row = BroadcastRow::from_domain(broadcast)?;
        let confirmation_rows = fanout
            .iter()
            .map(ConfirmationRow::from_domain)
            .collect::<Result<Vec<_>>>()?;
        let mut conn = self.conn()?;

        conn.transaction(|conn| {
            diesel::insert_into(broadcasts::table)
                .values(&broadcast_row)
                .execute(&mut *conn)?;

            for row in &confirmation_rows {
                diesel::insert_into(confirmations::table)
                    .values(row)
                    .execute(&mut *conn)?;
            }
            Ok(())
        })
        .map_err(|e: diesel::result::Error| {
            map_db_err("broadcast correlation id already used", e)
        })
    }

    async fn get_broadcast(&self, id: &BroadcastId) -> Result<Option<TradeBroadcast>> {
        let mut conn = self.conn()?;

        let row: Option<BroadcastRow> = broadcasts::table
            .find(id.to_string())
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(BroadcastRow::into_domain).transpose()
    }

    async fn expired_with_pending(&self, now: DateTime<Utc>) -> Result<Vec<TradeBroadcast>> {
        let mut conn = self.conn()?;

        let pending_broadcasts = confirmations::table
            .select(confirmations::broadcast_id)
            .filter(confirmations::status.eq(ConfirmationStatus::Pending.as_str()));

        let rows: Vec<BroadcastRow> = broadcasts::table
            .filter(broadcasts::expires_at.lt(fmt_ts(now)))
            .filter(broadcasts::id.eq_any(pending_broadcasts))
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(BroadcastRow::into_domain).collect()
    }

    async fn expiring_within(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<TradeBroadcast>> {
        let mut conn = self.conn()?;

        let rows: Vec<BroadcastRow> = broadcasts::table
            .filter(broadcasts::expires_at.gt(fmt_ts(now)))
            .filter(broadcasts::expires_at.le(fmt_ts(now + window)))
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(BroadcastRow::into_domain).collect()
    }

    async fn created_since_for_generators(
        &self,
        generators: &[Address],
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeBroadcast>> {
        if generators.is_empty() {
            return Ok(Vec::new());
        }
        let addresses: Vec<&str> = generators.iter().map(Address::as_str).collect();
        let mut conn = self.conn()?;

        let rows: Vec<BroadcastRow> = broadcasts::table
            .filter(broadcasts::generator_address.eq_any(addresses))
            .filter(broadcasts::broadcast_at.gt(fmt_ts(since)))
            .order(broadcasts::broadcast_at.asc())
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(BroadcastRow::into_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::sqlite::connection::{create_pool, run_migrations};
    use crate::domain::broadcast::ExpiryWindow;
    use crate::port::store::ConfirmationStore;
    use serde_json::json;

    fn store() -> SqliteStore {
        let pool = create_pool(":memory:").expect("create pool");
        run_migrations(&pool).expect("migrate");
        SqliteStore::new(pool)
    }

    const GEN: &str = "0x1111111111111111111111111111111111111111";
    const CON: &str = "0x2222222222222222222222222222222222222222";

    fn broadcast(now: DateTime<Utc>) -> TradeBroadcast {
        TradeBroadcast::new(
            None,
            Address::from(GEN),
            "swap",
            "uniswap-v3",
            json!({"amount": "100", "token": "WETH"}),
            vec!["amount".into()],
            "mainnet",
            ExpiryWindow::try_new(5).unwrap(),
            now,
        )
    }

    #[tokio::test]
    async fn fanout_is_atomic_on_duplicate_correlation() {
        let store = store();
        let now = Utc::now();
        let first = broadcast(now);
        let pending = TradeConfirmation::new_pending(&first, Address::from(CON), now);
        store
            .create_with_confirmations(&first, std::slice::from_ref(&pending))
            .await
            .unwrap();

        let mut replay = broadcast(now);
        replay.correlation_id = first.correlation_id.clone();
        let orphan = TradeConfirmation::new_pending(&replay, Address::from(CON), now);
        let err = store
            .create_with_confirmations(&replay, std::slice::from_ref(&orphan))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // The orphan confirmation was rolled back with the broadcast.
        assert!(store.get_confirmation(&orphan.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_with_pending_ignores_settled_broadcasts() {
        let store = store();
        let now = Utc::now();

        let mut stale = broadcast(now);
        stale.expires_at = now - Duration::minutes(1);
        let pending = TradeConfirmation::new_pending(&stale, Address::from(CON), now);
        store
            .create_with_confirmations(&stale, std::slice::from_ref(&pending))
            .await
            .unwrap();

        let mut settled = broadcast(now);
        settled.expires_at = now - Duration::minutes(1);
        store.create_with_confirmations(&settled, &[]).await.unwrap();

        let found = store.expired_with_pending(now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, stale.id);
    }

    #[tokio::test]
    async fn expiring_within_excludes_already_expired() {
        let store = store();
        let now = Utc::now();

        let mut soon = broadcast(now);
        soon.expires_at = now + Duration::minutes(3);
        store.create_with_confirmations(&soon, &[]).await.unwrap();

        let mut gone = broadcast(now);
        gone.expires_at = now - Duration::minutes(1);
        store.create_with_confirmations(&gone, &[]).await.unwrap();

        let found = store.expiring_within(now, Duration::minutes(5)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, soon.id);
    }

    #[tokio::test]
    async fn created_since_filters_by_generator_and_time() {
        let store = store();
        let now = Utc::now();

        let fresh = broadcast(now);
        store.create_with_confirmations(&fresh, &[]).await.unwrap();

        let mut old = broadcast(now);
        old.broadcast_at = now - Duration::hours(2);
        store.create_with_confirmations(&old, &[]).await.unwrap();

        let found = store
            .created_since_for_generators(&[Address::from(GEN)], now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, fresh.id);

        let none = store
            .created_since_for_generators(&[], now - Duration::hours(1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
