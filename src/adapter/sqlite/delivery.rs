use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::model::{fmt_ts, parse_ts, DeliveryRow};
use super::schema::deliveries;
use super::SqliteStore;
use crate::domain::delivery::{DeliveryRecord, DeliveryStatus};
use crate::domain::id::{Address, DeliveryId};
use crate::error::{Error, Result};
use crate::port::store::DeliveryStore;

impl DeliveryStore for SqliteStore {
    async fn enqueue(&self, record: &DeliveryRecord) -> Result<()> {
        let row = DeliveryRow::from_domain(record)?;
        let mut conn = self.conn()?;

        diesel::insert_into(deliveries::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn retryable(&self, max_retries: i32) -> Result<Vec<DeliveryRecord>> {
        let mut conn = self.conn()?;

        let rows: Vec<DeliveryRow> = deliveries::table
            .filter(deliveries::status.ne(DeliveryStatus::Delivered.as_str()))
            .filter(deliveries::retry_count.lt(max_retries))
            .order(deliveries::queued_at.asc())
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(DeliveryRow::into_domain).collect()
    }

    async fn mark_delivered(&self, id: &DeliveryId, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn()?;

        let updated = diesel::update(deliveries::table.filter(deliveries::id.eq(id.as_str())))
            .set((
                deliveries::status.eq(DeliveryStatus::Delivered.as_str()),
                deliveries::delivered_at.eq(fmt_ts(at)),
                deliveries::last_attempt_at.eq(fmt_ts(at)),
            ))
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        if updated == 0 {
            return Err(Error::not_found("delivery", id.as_str()));
        }
        Ok(())
    }

    async fn mark_failed_attempt(&self, id: &DeliveryId, at: DateTime<Utc>) -> Result<i32> {
        let mut conn = self.conn()?;

        conn.transaction(|conn| {
            let updated =
                diesel::update(deliveries::table.filter(deliveries::id.eq(id.as_str())))
                    .set((
                        deliveries::status.eq(DeliveryStatus::Failed.as_str()),
                        deliveries::retry_count.eq(deliveries::retry_count + 1),
                        deliveries::last_attempt_at.eq(fmt_ts(at)),
                    ))
                    .execute(&mut *conn)?;

            if updated == 0 {
                return Ok(None);
            }

            deliveries::table
                .find(id.to_string())
                .select(deliveries::retry_count)
                .first::<i32>(&mut *conn)
                .map(Some)
        })
        .map_err(|e: diesel::result::Error| Error::Database(e.to_string()))?
        .ok_or_else(|| Error::not_found("delivery", id.as_str()))
    }

    async fn undelivered_for(&self, consumer: &Address) -> Result<Vec<DeliveryRecord>> {
        let mut conn = self.conn()?;

        let rows: Vec<DeliveryRow> = deliveries::table
            .filter(deliveries::consumer_address.eq(consumer.as_str()))
            .filter(deliveries::status.ne(DeliveryStatus::Delivered.as_str()))
            .order(deliveries::queued_at.asc())
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(DeliveryRow::into_domain).collect()
    }

    async fn last_delivered_at(&self, consumer: &Address) -> Result<Option<DateTime<Utc>>> {
        let mut conn = self.conn()?;

        let latest: Option<Option<String>> = deliveries::table
            .filter(deliveries::consumer_address.eq(consumer.as_str()))
            .filter(deliveries::status.eq(DeliveryStatus::Delivered.as_str()))
            .select(diesel::dsl::max(deliveries::delivered_at))
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        latest.flatten().as_deref().map(parse_ts).transpose()
    }
}
