mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tradecast::adapter::sqlite::SqliteStore;
use tradecast::app::dispatcher::EventDispatcher;
use tradecast::app::listener::ChainEventListener;
use tradecast::config::{ChainConfig, ReconnectConfig};
use tradecast::domain::event::DomainEvent;
use tradecast::error::Error;
use tradecast::port::chain::{ChainEvent, TxDetails};
use tradecast::port::store::{AccountStore, SubscriptionStore};
use tradecast::testkit::{addr, tx, ScriptedChainClient};

use support::{registry, TempDb};

fn listener(
    db: &TempDb,
    client: ScriptedChainClient,
    dispatcher: EventDispatcher,
) -> ChainEventListener<SqliteStore, ScriptedChainClient> {
    let store = db.store();
    let reg = Arc::new(registry(store.clone(), dispatcher.clone()));
    ChainEventListener::new(client, store, reg, dispatcher, ChainConfig::default())
}

fn created_event(n: u8) -> ChainEvent {
    ChainEvent::SubscriptionCreated {
        generator: addr(1),
        encrypted_subscriber: "enc:blob".to_string(),
        tx_hash: tx(n),
    }
}

fn payment(n: u8, from: u8) -> TxDetails {
    TxDetails {
        hash: tx(n),
        from: addr(from),
        value_wei: "1000000000000000000".to_string(),
    }
}

#[tokio::test]
async fn backfill_creates_the_subscription_from_a_chain_event() {
    let db = TempDb::create("ls-create");
    let store = db.store();
    let client = ScriptedChainClient::new()
        .with_historical(vec![created_event(0x10)])
        .with_transaction(payment(0x10, 2));

    let mut listener = listener(&db, client, EventDispatcher::new(16));
    assert_eq!(listener.backfill(0, 100).await.unwrap(), 1);

    let sub = store.find_by_tx_hash(&tx(0x10)).await.unwrap().unwrap();
    assert_eq!(sub.generator, addr(1));
    assert_eq!(sub.consumer, addr(2));
    assert_eq!(sub.fee_amount, "1000000000000000000");
    assert_eq!(sub.encrypted_address.as_deref(), Some("enc:blob"));

    // The payer gets a consumer account carrying the encrypted blob.
    let account = store.get_consumer(&addr(2)).await.unwrap().unwrap();
    assert_eq!(account.encrypted_address.as_deref(), Some("enc:blob"));
}

#[tokio::test]
async fn redelivered_subscription_event_is_a_no_op() {
    let db = TempDb::create("ls-dedupe");
    let store = db.store();
    let client = ScriptedChainClient::new()
        .with_historical(vec![created_event(0x10), created_event(0x10)])
        .with_transaction(payment(0x10, 2));

    let mut listener = listener(&db, client, EventDispatcher::new(16));
    listener.backfill(0, 100).await.unwrap();
    listener.backfill(0, 100).await.unwrap();

    let active = store
        .active_for_consumer(&addr(2), Utc::now())
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn cancellation_event_deactivates_the_pair() {
    let db = TempDb::create("ls-cancel");
    let store = db.store();
    let client = ScriptedChainClient::new()
        .with_historical(vec![
            created_event(0x10),
            ChainEvent::SubscriptionCancelled {
                generator: addr(1),
                tx_hash: tx(0x11),
            },
        ])
        .with_transaction(payment(0x10, 2))
        .with_transaction(payment(0x11, 2));

    let mut listener = listener(&db, client, EventDispatcher::new(16));
    listener.backfill(0, 100).await.unwrap();

    let active = store
        .active_for_consumer(&addr(2), Utc::now())
        .await
        .unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn generator_registration_is_recorded_once() {
    let db = TempDb::create("ls-generator");
    let store = db.store();
    let dispatcher = EventDispatcher::new(16);
    let mut events = dispatcher.subscribe();
    let client = ScriptedChainClient::new().with_historical(vec![
        ChainEvent::GeneratorRegistered {
            generator: addr(5),
            tx_hash: tx(0x20),
        },
        ChainEvent::GeneratorRegistered {
            generator: addr(5),
            tx_hash: tx(0x21),
        },
    ]);

    let mut listener = listener(&db, client, dispatcher);
    listener.backfill(0, 100).await.unwrap();

    let account = store.get_generator(&addr(5)).await.unwrap().unwrap();
    assert!(account.is_active);
    assert_eq!(account.tx_hash, Some(tx(0x20)));

    // Exactly one registration event for the pair of logs.
    match events.recv().await.unwrap() {
        DomainEvent::GeneratorRegistered { generator } => assert_eq!(generator, addr(5)),
        other => panic!("unexpected event: {}", other.kind()),
    }
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn run_processes_live_events_and_reconnects_on_stream_end() {
    let db = TempDb::create("ls-run");
    let store = db.store();
    let client = ScriptedChainClient::new()
        .with_event(created_event(0x30))
        .with_transaction(payment(0x30, 2));
    let handle = client.handle();

    let mut config = ChainConfig::default();
    config.reconnect = ReconnectConfig {
        initial_delay_ms: 1,
        backoff_multiplier: 1.0,
        max_delay_ms: 5,
        max_attempts: 3,
    };
    let reg = Arc::new(registry(store.clone(), EventDispatcher::new(16)));
    let mut listener = ChainEventListener::new(
        client,
        store.clone(),
        reg,
        EventDispatcher::new(16),
        config,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(async move { listener.run(shutdown_rx).await });

    // Wait for the scripted event to land.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if store.find_by_tx_hash(&tx(0x30)).await.unwrap().is_some() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "event never processed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    shutdown_tx.send(true).unwrap();
    task.await.unwrap().unwrap();

    // The drained script reads as stream end, so the listener reconnected
    // and re-subscribed at least once before shutdown.
    assert!(handle.connects() >= 2);
    assert_eq!(handle.connects(), handle.subscribes());
}

#[tokio::test]
async fn reconnect_gives_up_after_max_attempts() {
    let db = TempDb::create("ls-giveup");
    let client = ScriptedChainClient::new();
    let handle = client.handle();

    let mut config = ChainConfig::default();
    config.reconnect = ReconnectConfig {
        initial_delay_ms: 1,
        backoff_multiplier: 2.0,
        max_delay_ms: 5,
        max_attempts: 3,
    };
    let store = db.store();
    let reg = Arc::new(registry(store.clone(), EventDispatcher::new(16)));
    let mut listener =
        ChainEventListener::new(client, store, reg, EventDispatcher::new(16), config);

    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(async move { listener.run(shutdown_rx).await });

    // Let the initial connect land, then make the endpoint unreachable. The
    // empty script reads as stream end, so a reconnect cycle starts and
    // burns through its attempts.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handle.connects() == 0 {
        assert!(tokio::time::Instant::now() < deadline, "never connected");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    handle.fail_next_connects(100);

    let result = task.await.unwrap();
    assert!(matches!(result, Err(Error::Connection(_))));
}
