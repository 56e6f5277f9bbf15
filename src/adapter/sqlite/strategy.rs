use diesel::prelude::*;

use super::model::StrategyRow;
use super::schema::strategies;
use super::{map_db_err, SqliteStore};
use crate::domain::id::StrategyId;
use crate::domain::strategy::Strategy;
use crate::error::{Error, Result};
use crate::port::store::StrategyStore;

impl StrategyStore for SqliteStore {
    async fn insert_strategy(&self, strategy: &Strategy) -> Result<()> {
        let row = StrategyRow::from_domain(strategy)?;
        let mut conn = self.conn()?;

        diesel::insert_into(strategies::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| map_db_err("strategy name already taken", e))?;

        Ok(())
    }

    async fn get_strategy(&self, id: &StrategyId) -> Result<Option<Strategy>> {
        let mut conn = self.conn()?;

        let row: Option<StrategyRow> = strategies::table
            .find(id.to_string())
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(StrategyRow::into_domain).transpose()
    }
}
