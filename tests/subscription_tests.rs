mod support;

use alloy_primitives::U256;
use tradecast::app::dispatcher::EventDispatcher;
use tradecast::app::registry::SubscribeRequest;
use tradecast::domain::event::DomainEvent;
use tradecast::domain::id::TxHash;
use tradecast::domain::subscription::SUBSCRIPTION_TERM_DAYS;
use tradecast::error::Error;
use tradecast::port::store::SubscriptionStore;
use tradecast::testkit::addr;

use support::{registry, seed_subscription, TempDb};

#[tokio::test]
async fn subscription_runs_for_thirty_days() {
    let db = TempDb::create("sub-term");
    let registry = registry(db.store(), EventDispatcher::new(8));

    let sub = seed_subscription(&registry, &addr(1), &addr(2)).await;
    assert_eq!(
        sub.expires_at - sub.subscribed_at,
        chrono::Duration::days(SUBSCRIPTION_TERM_DAYS)
    );
    assert!(sub.is_active);
    // The registry encrypts the consumer address when none is supplied.
    assert_eq!(
        sub.encrypted_address.as_deref(),
        Some(format!("enc:{}", addr(2)).as_str())
    );
}

#[tokio::test]
async fn duplicate_active_pair_is_conflict() {
    let db = TempDb::create("sub-dup");
    let registry = registry(db.store(), EventDispatcher::new(8));
    seed_subscription(&registry, &addr(1), &addr(2)).await;

    let err = registry
        .subscribe(SubscribeRequest {
            generator: addr(1),
            consumer: addr(2),
            fee_amount: "5".to_string(),
            encrypted_address: None,
            tx_hash: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn subscribe_emits_event() {
    let db = TempDb::create("sub-event");
    let dispatcher = EventDispatcher::new(8);
    let mut events = dispatcher.subscribe();
    let registry = registry(db.store(), dispatcher);

    let sub = seed_subscription(&registry, &addr(1), &addr(2)).await;

    match events.recv().await.unwrap() {
        DomainEvent::SubscriptionCreated {
            subscription_id,
            consumer,
            ..
        } => {
            assert_eq!(subscription_id, sub.id);
            assert_eq!(consumer, addr(2));
        }
        other => panic!("unexpected event: {}", other.kind()),
    }
}

#[tokio::test]
async fn check_expiry_deactivates_and_emits_once() {
    let db = TempDb::create("sub-expiry");
    let store = db.store();
    let dispatcher = EventDispatcher::new(8);
    let mut events = dispatcher.subscribe();
    let registry = registry(store.clone(), dispatcher);

    let sub = seed_subscription(&registry, &addr(1), &addr(2)).await;
    let _ = events.recv().await.unwrap();

    // Backdate past the term.
    let mut stale = sub.clone();
    stale.subscribed_at = sub.subscribed_at - chrono::Duration::days(40);
    stale.expires_at = sub.expires_at - chrono::Duration::days(40);
    store.set_active(&sub.id, false).await.unwrap();
    stale.id = tradecast::domain::id::SubscriptionId::new();
    store.insert(&stale).await.unwrap();

    assert_eq!(registry.check_expiry().await.unwrap(), 1);
    match events.recv().await.unwrap() {
        DomainEvent::SubscriptionExpired { generator, .. } => assert_eq!(generator, addr(1)),
        other => panic!("unexpected event: {}", other.kind()),
    }

    assert_eq!(registry.check_expiry().await.unwrap(), 0);
}

#[tokio::test]
async fn revenue_sums_active_fees_in_wei() {
    let db = TempDb::create("sub-revenue");
    let registry = registry(db.store(), EventDispatcher::new(8));

    // Two subscribers at 10^21 wei each; the sum overflows u64.
    for consumer in [addr(2), addr(3)] {
        registry
            .subscribe(SubscribeRequest {
                generator: addr(1),
                consumer,
                fee_amount: "1000000000000000000000".to_string(),
                encrypted_address: None,
                tx_hash: None,
            })
            .await
            .unwrap();
    }

    let revenue = registry.generator_revenue(&addr(1)).await.unwrap();
    assert_eq!(
        revenue,
        U256::from(2u64) * U256::from(10u64).pow(U256::from(21u64))
    );
}

#[tokio::test]
async fn cancel_deactivates_the_pair() {
    let db = TempDb::create("sub-cancel");
    let registry = registry(db.store(), EventDispatcher::new(8));
    seed_subscription(&registry, &addr(1), &addr(2)).await;

    let cancelled = registry.cancel(&addr(1), &addr(2)).await.unwrap();
    assert!(cancelled.is_some());
    assert!(registry
        .active_subscriptions(&addr(2))
        .await
        .unwrap()
        .is_empty());

    // Second cancellation finds nothing and is not an error.
    assert!(registry.cancel(&addr(1), &addr(2)).await.unwrap().is_none());
}

#[tokio::test]
async fn resubscription_allowed_after_cancel() {
    let db = TempDb::create("sub-resub");
    let registry = registry(db.store(), EventDispatcher::new(8));
    seed_subscription(&registry, &addr(1), &addr(2)).await;
    registry.cancel(&addr(1), &addr(2)).await.unwrap();

    let renewed = registry
        .subscribe(SubscribeRequest {
            generator: addr(1),
            consumer: addr(2),
            fee_amount: "7".to_string(),
            encrypted_address: None,
            tx_hash: Some(TxHash::new("0xrenew")),
        })
        .await
        .unwrap();
    assert!(renewed.is_active);
}
