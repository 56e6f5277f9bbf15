mod support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tradecast::adapter::sqlite::SqliteStore;
use tradecast::adapter::sse::{ConnectionRegistry, SseFrame};
use tradecast::app::delivery::DeliveryService;
use tradecast::app::dispatcher::EventDispatcher;
use tradecast::config::DeliveryConfig;
use tradecast::domain::broadcast::{ExpiryWindow, TradeBroadcast};
use tradecast::domain::event::DomainEvent;
use tradecast::domain::id::{BroadcastId, ConfirmationId, CorrelationId};
use tradecast::port::store::{BroadcastStore, DeliveryStore};
use tradecast::testkit::addr;

use support::{registry, seed_subscription, TempDb};

fn service(
    store: Arc<SqliteStore>,
    connections: Arc<ConnectionRegistry>,
) -> DeliveryService<SqliteStore> {
    DeliveryService::new(
        store,
        connections,
        EventDispatcher::new(16),
        DeliveryConfig::default(),
    )
}

fn trade_created() -> DomainEvent {
    DomainEvent::TradeCreated {
        confirmation_id: ConfirmationId::new(),
        broadcast_id: BroadcastId::new(),
        correlation_id: CorrelationId::new(),
        generator: addr(1),
        consumer: addr(2),
        function_name: "swap".into(),
        protocol: "uniswap-v3".into(),
        parameters: json!({"amount": "100"}),
        expires_at: Utc::now() + Duration::minutes(5),
    }
}

#[tokio::test]
async fn connected_consumer_gets_the_frame_directly() {
    let db = TempDb::create("dl-live");
    let store = db.store();
    let connections = Arc::new(ConnectionRegistry::new());
    let (tx, mut rx) = mpsc::channel(8);
    connections.register(addr(2), tx);

    let service = service(store.clone(), connections);
    service.dispatch(&trade_created()).await.unwrap();

    match rx.recv().await.unwrap() {
        SseFrame::Event { name, data } => {
            assert_eq!(name, "pending-trades");
            let payload: serde_json::Value = serde_json::from_str(&data).unwrap();
            assert_eq!(payload["consumer"], addr(2).as_str());
        }
        SseFrame::Heartbeat => panic!("expected an event frame"),
    }

    // Nothing queued for a delivered push.
    assert!(store.undelivered_for(&addr(2)).await.unwrap().is_empty());
}

#[tokio::test]
async fn offline_consumer_gets_a_queued_record() {
    let db = TempDb::create("dl-offline");
    let store = db.store();
    let service = service(store.clone(), Arc::new(ConnectionRegistry::new()));

    let event = trade_created();
    service.dispatch(&event).await.unwrap();

    let queued = store.undelivered_for(&addr(2)).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].event_name, "pending-trades");
    assert_eq!(queued[0].broadcast_id.as_ref(), event.broadcast_id());
    assert_eq!(queued[0].retry_count, 0);
}

#[tokio::test]
async fn events_without_a_target_are_not_queued() {
    let db = TempDb::create("dl-notarget");
    let store = db.store();
    let service = service(store.clone(), Arc::new(ConnectionRegistry::new()));

    service
        .dispatch(&DomainEvent::SubscriptionCancelled {
            generator: addr(1),
            consumer: addr(2),
        })
        .await
        .unwrap();

    assert!(store.undelivered_for(&addr(2)).await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_delivers_once_the_consumer_reconnects() {
    let db = TempDb::create("dl-retry");
    let store = db.store();
    let connections = Arc::new(ConnectionRegistry::new());
    let service = service(store.clone(), connections.clone());

    service.dispatch(&trade_created()).await.unwrap();
    assert_eq!(service.retry_failed().await.unwrap(), 0);
    assert_eq!(store.undelivered_for(&addr(2)).await.unwrap()[0].retry_count, 1);

    let (tx, mut rx) = mpsc::channel(8);
    connections.register(addr(2), tx);
    assert_eq!(service.retry_failed().await.unwrap(), 1);

    match rx.recv().await.unwrap() {
        SseFrame::Event { name, .. } => assert_eq!(name, "pending-trades"),
        SseFrame::Heartbeat => panic!("expected an event frame"),
    }
    assert!(store.undelivered_for(&addr(2)).await.unwrap().is_empty());
}

#[tokio::test]
async fn retries_stop_at_the_cap() {
    let db = TempDb::create("dl-cap");
    let store = db.store();
    let service = service(store.clone(), Arc::new(ConnectionRegistry::new()));

    service.dispatch(&trade_created()).await.unwrap();
    for _ in 0..DeliveryConfig::default().max_retries {
        assert_eq!(service.retry_failed().await.unwrap(), 0);
    }

    // The record is exhausted but stays visible as undelivered.
    let stranded = store.undelivered_for(&addr(2)).await.unwrap();
    assert_eq!(stranded[0].retry_count, DeliveryConfig::default().max_retries);
    assert!(store
        .retryable(DeliveryConfig::default().max_retries)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn missed_broadcasts_cover_subscribed_generators_since_cutoff() {
    let db = TempDb::create("dl-missed");
    let store = db.store();
    let reg = registry(store.clone(), EventDispatcher::new(8));
    seed_subscription(&reg, &addr(1), &addr(2)).await;

    let now = Utc::now();
    let window = ExpiryWindow::try_new(5).unwrap();
    let mut old = TradeBroadcast::new(
        None,
        addr(1),
        "swap",
        "uniswap-v3",
        json!({"amount": "1"}),
        vec!["amount".into()],
        "mainnet",
        window,
        now,
    );
    old.broadcast_at = now - Duration::hours(2);
    store.create_with_confirmations(&old, &[]).await.unwrap();

    let recent = TradeBroadcast::new(
        None,
        addr(1),
        "swap",
        "uniswap-v3",
        json!({"amount": "2"}),
        vec!["amount".into()],
        "mainnet",
        window,
        now,
    );
    store.create_with_confirmations(&recent, &[]).await.unwrap();

    // A generator the consumer never subscribed to is invisible.
    let foreign = TradeBroadcast::new(
        None,
        addr(9),
        "swap",
        "uniswap-v3",
        json!({"amount": "3"}),
        vec!["amount".into()],
        "mainnet",
        window,
        now,
    );
    store.create_with_confirmations(&foreign, &[]).await.unwrap();

    let service = service(store, Arc::new(ConnectionRegistry::new()));
    let missed = service
        .missed_broadcasts(&addr(2), now - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(missed.len(), 1);
    assert_eq!(missed[0].id, recent.id);
}

#[tokio::test]
async fn health_reports_connectivity_and_backlog() {
    let db = TempDb::create("dl-health");
    let store = db.store();
    let connections = Arc::new(ConnectionRegistry::new());
    let service = service(store.clone(), connections.clone());

    service.dispatch(&trade_created()).await.unwrap();

    let health = service.delivery_health(&addr(2)).await.unwrap();
    assert!(!health.connected);
    assert_eq!(health.undelivered, 1);
    assert!(health.last_delivered_at.is_none());

    let (tx, _rx) = mpsc::channel(8);
    connections.register(addr(2), tx);
    service.retry_failed().await.unwrap();

    let health = service.delivery_health(&addr(2)).await.unwrap();
    assert!(health.connected);
    assert_eq!(health.undelivered, 0);
    assert!(health.last_delivered_at.is_some());
}
