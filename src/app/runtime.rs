//! Service wiring and lifecycle.
//!
//! Everything is constructed explicitly here and shared through `Arc`; no
//! global singletons. Background tasks watch one shutdown channel.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::adapter::chain::WsChainClient;
use crate::adapter::cipher::AesAddressCipher;
use crate::adapter::executor::TableGasExecutor;
use crate::adapter::sqlite::connection::{create_pool, run_migrations};
use crate::adapter::sqlite::SqliteStore;
use crate::adapter::sse::ConnectionRegistry;
use crate::config::Config;
use crate::error::Result;
use crate::port::cipher::AddressCipher;
use crate::port::executor::ProtocolExecutor;

use super::broadcast::BroadcastEngine;
use super::confirmation::ConfirmationService;
use super::delivery::DeliveryService;
use super::dispatcher::EventDispatcher;
use super::expiry::ExpiryMonitor;
use super::listener::ChainEventListener;
use super::registry::SubscriptionRegistry;

pub struct Runtime {
    pub store: Arc<SqliteStore>,
    pub connections: Arc<ConnectionRegistry>,
    pub dispatcher: EventDispatcher,
    pub registry: Arc<SubscriptionRegistry<SqliteStore>>,
    pub broadcasts: Arc<BroadcastEngine<SqliteStore>>,
    pub confirmations: Arc<ConfirmationService<SqliteStore>>,
    pub expiry: Arc<ExpiryMonitor<SqliteStore>>,
    pub delivery: Arc<DeliveryService<SqliteStore>>,
    config: Config,
    shutdown_tx: watch::Sender<bool>,
}

impl Runtime {
    /// Build every service against one SQLite pool, running migrations.
    pub fn build(config: Config) -> Result<Self> {
        let pool = create_pool(&config.database.url)?;
        run_migrations(&pool)?;
        let store = Arc::new(SqliteStore::new(pool));

        let cipher: Arc<dyn AddressCipher> =
            Arc::new(AesAddressCipher::from_hex_key(&config.cipher.key_hex)?);
        let executor: Arc<dyn ProtocolExecutor> = Arc::new(TableGasExecutor::new(
            config.broadcast.fallback_gas_limit,
            config.broadcast.fallback_gas_price_wei,
        ));

        let dispatcher = EventDispatcher::new(config.delivery.dispatcher_capacity);
        let connections = Arc::new(ConnectionRegistry::new());

        let registry = Arc::new(SubscriptionRegistry::new(
            store.clone(),
            cipher,
            dispatcher.clone(),
        ));
        let broadcasts = Arc::new(BroadcastEngine::new(
            store.clone(),
            executor.clone(),
            dispatcher.clone(),
            config.broadcast.clone(),
        ));
        let confirmations = Arc::new(ConfirmationService::new(store.clone(), executor));
        let expiry = Arc::new(ExpiryMonitor::new(
            store.clone(),
            registry.clone(),
            dispatcher.clone(),
            config.expiry.clone(),
        ));
        let delivery = Arc::new(DeliveryService::new(
            store.clone(),
            connections.clone(),
            dispatcher.clone(),
            config.delivery.clone(),
        ));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            store,
            connections,
            dispatcher,
            registry,
            broadcasts,
            confirmations,
            expiry,
            delivery,
            config,
            shutdown_tx,
        })
    }

    /// Spawn the background tasks: expiry sweeps, the delivery pump, and
    /// (when a chain endpoint is configured) the event listener.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let expiry = self.expiry.clone();
        let shutdown = self.shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            expiry.run(shutdown).await;
        }));

        let delivery = self.delivery.clone();
        let shutdown = self.shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            delivery.run(shutdown).await;
        }));

        if !self.config.chain.ws_url.is_empty() {
            let client = WsChainClient::new(
                self.config.chain.ws_url.clone(),
                self.config.chain.contract_address.clone(),
            );
            let mut listener = ChainEventListener::new(
                client,
                self.store.clone(),
                self.registry.clone(),
                self.dispatcher.clone(),
                self.config.chain.clone(),
            );
            let shutdown = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                if let Err(e) = listener.run(shutdown).await {
                    error!(error = %e, "Chain listener exited");
                }
            }));
        }

        handles
    }

    /// Signal every background task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
