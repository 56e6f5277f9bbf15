use diesel::prelude::*;

use super::model::{ConsumerRow, GeneratorRow};
use super::schema::{consumers, generators};
use super::SqliteStore;
use crate::domain::account::{ConsumerAccount, GeneratorAccount};
use crate::domain::id::Address;
use crate::error::{Error, Result};
use crate::port::store::AccountStore;

impl AccountStore for SqliteStore {
    async fn upsert_generator(&self, account: &GeneratorAccount) -> Result<()> {
        let row = GeneratorRow::from_domain(account);
        let mut conn = self.conn()?;

        diesel::replace_into(generators::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_generator(&self, address: &Address) -> Result<Option<GeneratorAccount>> {
        let mut conn = self.conn()?;

        let row: Option<GeneratorRow> = generators::table
            .find(address.to_string())
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(GeneratorRow::into_domain).transpose()
    }

    async fn upsert_consumer(&self, account: &ConsumerAccount) -> Result<()> {
        let mut row = ConsumerRow::from_domain(account);
        let mut conn = self.conn()?;

        conn.transaction(|conn| {
            // Do not clobber a previously stored encrypted address.
            if row.encrypted_address.is_none() {
                let existing: Option<Option<String>> = consumers::table
                    .find(&row.address)
                    .select(consumers::encrypted_address)
                    .first(&mut *conn)
                    .optional()?;
                if let Some(encrypted) = existing.flatten() {
                    row.encrypted_address = Some(encrypted);
                }
            }

            diesel::replace_into(consumers::table)
                .values(&row)
                .execute(&mut *conn)?;
            Ok(())
        })
        .map_err(|e: diesel::result::Error| Error::Database(e.to_string()))
    }

    async fn get_consumer(&self, address: &Address) -> Result<Option<ConsumerAccount>> {
        let mut conn = self.conn()?;

        let row: Option<ConsumerRow> = consumers::table
            .find(address.to_string())
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(ConsumerRow::into_domain).transpose()
    }
}
