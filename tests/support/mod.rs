// Not every suite uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use tradecast::adapter::sqlite::connection::{create_pool, run_migrations, DbPool};
use tradecast::adapter::sqlite::SqliteStore;
use tradecast::app::dispatcher::EventDispatcher;
use tradecast::app::registry::{SubscribeRequest, SubscriptionRegistry};
use tradecast::domain::account::GeneratorAccount;
use tradecast::domain::id::Address;
use tradecast::domain::subscription::Subscription;
use tradecast::port::store::AccountStore;
use tradecast::testkit::StubCipher;

/// Temporary SQLite database for integration tests. The backing directory
/// is removed on drop.
pub struct TempDb {
    _dir: TempDir,
    pool: DbPool,
}

impl TempDb {
    pub fn create(name: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(format!("{name}.db"));

        let pool = create_pool(&path.display().to_string()).expect("create sqlite pool");
        run_migrations(&pool).expect("run migrations");

        Self { _dir: dir, pool }
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(self.pool.clone()))
    }
}

pub fn registry(
    store: Arc<SqliteStore>,
    dispatcher: EventDispatcher,
) -> SubscriptionRegistry<SqliteStore> {
    SubscriptionRegistry::new(store, Arc::new(StubCipher), dispatcher)
}

/// Insert an active generator account.
pub async fn seed_generator(store: &SqliteStore, address: &Address) {
    store
        .upsert_generator(&GeneratorAccount::new(address.clone(), Utc::now()))
        .await
        .expect("seed generator");
}

/// Subscribe `consumer` to `generator` with a 1 ETH fee.
pub async fn seed_subscription(
    registry: &SubscriptionRegistry<SqliteStore>,
    generator: &Address,
    consumer: &Address,
) -> Subscription {
    registry
        .subscribe(SubscribeRequest {
            generator: generator.clone(),
            consumer: consumer.clone(),
            fee_amount: "1000000000000000000".to_string(),
            encrypted_address: None,
            tx_hash: None,
        })
        .await
        .expect("seed subscription")
}
