mod support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tradecast::adapter::sqlite::SqliteStore;
use tradecast::app::dispatcher::EventDispatcher;
use tradecast::app::expiry::ExpiryMonitor;
use tradecast::config::ExpiryConfig;
use tradecast::domain::broadcast::{ExpiryWindow, TradeBroadcast};
use tradecast::domain::confirmation::{ConfirmationStatus, TradeConfirmation};
use tradecast::domain::event::DomainEvent;
use tradecast::port::store::{BroadcastStore, ConfirmationStore};
use tradecast::testkit::addr;

use support::{registry, TempDb};

fn monitor(
    store: Arc<SqliteStore>,
    dispatcher: EventDispatcher,
) -> ExpiryMonitor<SqliteStore> {
    let registry = Arc::new(registry(store.clone(), dispatcher.clone()));
    ExpiryMonitor::new(store, registry, dispatcher, ExpiryConfig::default())
}

fn broadcast_with_window(minutes_from_now: i64) -> TradeBroadcast {
    let now = Utc::now();
    let mut broadcast = TradeBroadcast::new(
        None,
        addr(1),
        "swap",
        "uniswap-v3",
        json!({"amount": "100"}),
        vec!["amount".into()],
        "mainnet",
        ExpiryWindow::try_new(5).unwrap(),
        now,
    );
    broadcast.expires_at = now + Duration::minutes(minutes_from_now);
    broadcast
}

#[tokio::test]
async fn sweep_expires_pending_and_emits_events() {
    let db = TempDb::create("exp-sweep");
    let store = db.store();
    let dispatcher = EventDispatcher::new(16);
    let mut events = dispatcher.subscribe();

    let stale = broadcast_with_window(-1);
    let now = Utc::now();
    let confirmations = vec![
        TradeConfirmation::new_pending(&stale, addr(2), now),
        TradeConfirmation::new_pending(&stale, addr(3), now),
    ];
    store
        .create_with_confirmations(&stale, &confirmations)
        .await
        .unwrap();

    let monitor = monitor(store.clone(), dispatcher);
    assert_eq!(monitor.sweep().await.unwrap(), 2);

    for confirmation in &confirmations {
        let stored = store.get_confirmation(&confirmation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConfirmationStatus::Expired);
    }

    for _ in 0..2 {
        match events.recv().await.unwrap() {
            DomainEvent::TradeExpired { broadcast_id, .. } => {
                assert_eq!(broadcast_id, stale.id);
            }
            other => panic!("unexpected event: {}", other.kind()),
        }
    }

    // A second sweep finds nothing to do.
    assert_eq!(monitor.sweep().await.unwrap(), 0);
}

#[tokio::test]
async fn sweep_skips_decided_confirmations() {
    let db = TempDb::create("exp-decided");
    let store = db.store();

    let stale = broadcast_with_window(-1);
    let now = Utc::now();
    let decided = TradeConfirmation::new_pending(&stale, addr(2), now);
    let pending = TradeConfirmation::new_pending(&stale, addr(3), now);
    store
        .create_with_confirmations(&stale, &[decided.clone(), pending.clone()])
        .await
        .unwrap();
    store
        .record_decision(
            &decided.id,
            ConfirmationStatus::Rejected,
            &decided.modified_parameters,
            now,
        )
        .await
        .unwrap();

    let monitor = monitor(store.clone(), EventDispatcher::new(16));
    assert_eq!(monitor.sweep().await.unwrap(), 1);

    let stored = store.get_confirmation(&decided.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConfirmationStatus::Rejected);
}

#[tokio::test]
async fn warnings_cover_soon_to_expire_broadcasts_only() {
    let db = TempDb::create("exp-warn");
    let store = db.store();
    let dispatcher = EventDispatcher::new(16);
    let mut events = dispatcher.subscribe();

    let soon = broadcast_with_window(3);
    let now = Utc::now();
    let pending = TradeConfirmation::new_pending(&soon, addr(2), now);
    store
        .create_with_confirmations(&soon, std::slice::from_ref(&pending))
        .await
        .unwrap();

    let distant = broadcast_with_window(30);
    let calm = TradeConfirmation::new_pending(&distant, addr(3), now);
    store
        .create_with_confirmations(&distant, std::slice::from_ref(&calm))
        .await
        .unwrap();

    let monitor = monitor(store.clone(), dispatcher);
    assert_eq!(monitor.send_expiry_warnings().await.unwrap(), 1);

    match events.recv().await.unwrap() {
        DomainEvent::ExpiryWarning {
            confirmation_id,
            broadcast_id,
            ..
        } => {
            assert_eq!(confirmation_id, pending.id);
            assert_eq!(broadcast_id, soon.id);
        }
        other => panic!("unexpected event: {}", other.kind()),
    }

    // Warnings do not mutate state; the confirmation is still pending.
    let stored = store.get_confirmation(&pending.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConfirmationStatus::Pending);
    assert_eq!(monitor.send_expiry_warnings().await.unwrap(), 1);
}
