//! SQLite implementation of the subscription store.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::model::{fmt_ts, SubscriptionRow};
use super::schema::subscriptions;
use super::{map_db_err, SqliteStore};
use crate::domain::id::{Address, SubscriptionId, TxHash};
use crate::domain::subscription::Subscription;
use crate::error::{Error, Result};
use crate::port::store::SubscriptionStore;

impl SubscriptionStore for SqliteStore {
    async fn insert(&self, subscription: &Subscription) -> Result<()> {
        let row = SubscriptionRow::from_domain(subscription);
        let mut conn = self.conn()?;

        diesel::insert_into(subscriptions::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| map_db_err("subscription already exists for this pair or tx", e))?;

        Ok(())
    }

    async fn get(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        let mut conn = self.conn()?;

        let row: Option<SubscriptionRow> = subscriptions::table
            .find(id.to_string())
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(SubscriptionRow::into_domain).transpose()
    }

    async fn find_by_tx_hash(&self, tx_hash: &TxHash) -> Result<Option<Subscription>> {
        let mut conn = self.conn()?;

        let row: Option<SubscriptionRow> = subscriptions::table
            .filter(subscriptions::tx_hash.eq(tx_hash.as_str()))
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(SubscriptionRow::into_domain).transpose()
    }

    async fn active_for_consumer(
        &self,
        consumer: &Address,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        let mut conn = self.conn()?;

        let rows: Vec<SubscriptionRow> = subscriptions::table
            .filter(subscriptions::consumer_address.eq(consumer.as_str()))
            .filter(subscriptions::is_active.eq(1))
            .filter(subscriptions::expires_at.gt(fmt_ts(now)))
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(SubscriptionRow::into_domain).collect()
    }

    async fn subscribers_of(
        &self,
        generator: &Address,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        let mut conn = self.conn()?;

        let rows: Vec<SubscriptionRow> = subscriptions::table
            .filter(subscriptions::generator_address.eq(generator.as_str()))
            .filter(subscriptions::is_active.eq(1))
            .filter(subscriptions::expires_at.gt(fmt_ts(now)))
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(SubscriptionRow::into_domain).collect()
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>> {
        let mut conn = self.conn()?;

        conn.transaction(|conn| {
            let expired: Vec<String> = subscriptions::table
                .select(subscriptions::id)
                .filter(subscriptions::is_active.eq(1))
                .filter(subscriptions::expires_at.lt(fmt_ts(now)))
                .load(&mut *conn)?;

            if expired.is_empty() {
                return Ok(Vec::new());
            }

            diesel::update(subscriptions::table.filter(subscriptions::id.eq_any(&expired)))
                .set(subscriptions::is_active.eq(0))
                .execute(&mut *conn)?;

            subscriptions::table
                .filter(subscriptions::id.eq_any(&expired))
                .load::<SubscriptionRow>(&mut *conn)
        })
        .map_err(|e: diesel::result::Error| Error::Database(e.to_string()))?
        .into_iter()
        .map(SubscriptionRow::into_domain)
        .collect()
    }

    async fn set_active(&self, id: &SubscriptionId, is_active: bool) -> Result<Subscription> {
        let mut conn = self.conn()?;

        let updated =
            diesel::update(subscriptions::table.filter(subscriptions::id.eq(id.as_str())))
                .set(subscriptions::is_active.eq(i32::from(is_active)))
                .execute(&mut conn)
                .map_err(|e| Error::Database(e.to_string()))?;

        if updated == 0 {
            return Err(Error::not_found("subscription", id.as_str()));
        }

        let row: SubscriptionRow = subscriptions::table
            .find(id.to_string())
            .first(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        row.into_domain()
    }

    async fn deactivate_pair(
        &self,
        generator: &Address,
        consumer: &Address,
    ) -> Result<Option<Subscription>> {
        let mut conn = self.conn()?;

        conn.transaction(|conn| {
            let row: Option<SubscriptionRow> = subscriptions::table
                .filter(subscriptions::generator_address.eq(generator.as_str()))
                .filter(subscriptions::consumer_address.eq(consumer.as_str()))
                .filter(subscriptions::is_active.eq(1))
                .first(&mut *conn)
                .optional()?;

            let Some(mut row) = row else {
                return Ok(None);
            };

            diesel::update(subscriptions::table.filter(subscriptions::id.eq(&row.id)))
                .set(subscriptions::is_active.eq(0))
                .execute(&mut *conn)?;

            row.is_active = 0;
            Ok(Some(row))
        })
        .map_err(|e: diesel::result::Error| Error::Database(e.to_string()))?
        .map(SubscriptionRow::into_domain)
        .transpose()
    }

    async fn generators_for_consumer(&self, consumer: &Address) -> Result<Vec<Address>> {
        let mut conn = self.conn()?;

        let rows: Vec<String> = subscriptions::table
            .select(subscriptions::generator_address)
            .filter(subscriptions::consumer_address.eq(consumer.as_str()))
            .distinct()
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Address::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::sqlite::connection::{create_pool, run_migrations};

    fn store() -> SqliteStore {
        let pool = create_pool(":memory:").expect("create pool");
        run_migrations(&pool).expect("migrate");
        SqliteStore::new(pool)
    }

    fn sub(generator: &str, consumer: &str) -> Subscription {
        Subscription::new(
            Address::from(generator),
            Address::from(consumer),
            "1000000000000000000",
            Utc::now(),
        )
        .unwrap()
    }

    const GEN: &str = "0x1111111111111111111111111111111111111111";
    const CON: &str = "0x2222222222222222222222222222222222222222";

    #[tokio::test]
    async fn duplicate_active_pair_conflicts() {
        let store = store();
        store.insert(&sub(GEN, CON)).await.unwrap();

        let err = store.insert(&sub(GEN, CON)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn resubscribe_allowed_after_deactivation() {
        let store = store();
        let first = sub(GEN, CON);
        store.insert(&first).await.unwrap();
        store.set_active(&first.id, false).await.unwrap();

        store.insert(&sub(GEN, CON)).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_tx_hash_conflicts() {
        let store = store();
        let first = sub(GEN, CON).with_tx_hash(TxHash::new("0xabc"));
        store.insert(&first).await.unwrap();
        store.set_active(&first.id, false).await.unwrap();

        // Same tx hash on a fresh row is a redelivery, not a new subscription.
        let replay = sub(GEN, CON).with_tx_hash(TxHash::new("0xabc"));
        let err = store.insert(&replay).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn deactivate_expired_is_idempotent() {
        let store = store();
        let mut expired = sub(GEN, CON);
        expired.expires_at = Utc::now() - chrono::Duration::hours(1);
        store.insert(&expired).await.unwrap();

        let first = store.deactivate_expired(Utc::now()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(!first[0].is_active);

        let second = store.deactivate_expired(Utc::now()).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn deactivate_pair_returns_row_once() {
        let store = store();
        store.insert(&sub(GEN, CON)).await.unwrap();

        let generator = Address::from(GEN);
        let consumer = Address::from(CON);
        let first = store.deactivate_pair(&generator, &consumer).await.unwrap();
        assert!(first.is_some());

        let second = store.deactivate_pair(&generator, &consumer).await.unwrap();
        assert!(second.is_none());
    }
}
