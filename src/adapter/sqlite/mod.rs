//! SQLite persistence adapter.
//!
//! One [`SqliteStore`] implements every store port against a shared r2d2
//! pool. Uniqueness rules that back race-safety (active subscription pair,
//! broadcast correlation id, tx-hash dedupe) live in the schema as unique
//! indexes; violations surface as [`Error::Conflict`].

pub mod connection;
pub mod model;
pub mod schema;

mod account;
mod broadcast;
mod confirmation;
mod delivery;
mod strategy;
mod subscription;

use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::SqliteConnection;

use crate::error::{Error, Result};
use connection::DbPool;

/// SQLite-backed implementation of all persistence ports.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) fn conn(
        &self,
    ) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>> {
        self.pool.get().map_err(|e| Error::Connection(e.to_string()))
    }
}

/// Map a Diesel error, turning unique-index violations into conflicts.
pub(crate) fn map_db_err(context: &'static str, e: diesel::result::Error) -> Error {
    match e {
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ) => Error::Conflict(context.to_string()),
        other => Error::Database(other.to_string()),
    }
}
