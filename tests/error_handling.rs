//! Error handling and edge case tests.

use aivent_realtime::{
    DispatchMode, EventInput, HistoryQuery, HubConfig, HubError, OverflowPolicy, RealtimeHub,
    SubscriberId, SubscriptionFilter,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn inline_config() -> HubConfig {
    HubConfig::default().with_dispatch(DispatchMode::Inline)
}

// --- Subscriber Limits ---

#[test]
fn test_subscriber_limit_enforced() {
    let hub = RealtimeHub::create(inline_config().with_max_subscribers(2)).unwrap();

    let first = hub.subscribe("a", |_| {}, SubscriptionFilter::all()).unwrap();
    hub.subscribe("b", |_| {}, SubscriptionFilter::all()).unwrap();

    let result = hub.subscribe("c", |_| {}, SubscriptionFilter::all());
    assert!(matches!(result, Err(HubError::SubscriberLimit { limit: 2 })));

    // Freeing a slot makes room again
    first.unsubscribe();
    hub.subscribe("c", |_| {}, SubscriptionFilter::all()).unwrap();
    assert_eq!(hub.subscriber_count(), 2);
}

#[test]
fn test_zero_subscriber_limit_is_invalid() {
    let result = RealtimeHub::create(inline_config().with_max_subscribers(0));
    assert!(matches!(result, Err(HubError::InvalidConfig(_))));
}

#[test]
fn test_empty_subscriber_id_rejected() {
    let hub = RealtimeHub::create(inline_config()).unwrap();
    let result = hub.subscribe("", |_| {}, SubscriptionFilter::all());
    assert!(matches!(result, Err(HubError::InvalidSubscriberId(_))));
}

// --- Expiry ---

#[test]
fn test_ttl_expiry() {
    let hub = RealtimeHub::create(inline_config()).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    let handle = hub
        .subscribe_with_ttl(
            "short-lived",
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            SubscriptionFilter::all(),
            Duration::from_millis(30),
        )
        .unwrap();

    hub.broadcast(EventInput::new("A", "m", json!({})));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    std::thread::sleep(Duration::from_millis(60));
    hub.broadcast(EventInput::new("B", "m", json!({})));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(hub.subscriber_count(), 0);
    assert!(!handle.is_active());
}

#[test]
fn test_expired_subscribers_free_limit_slots() {
    let hub = RealtimeHub::create(inline_config().with_max_subscribers(1)).unwrap();
    hub.subscribe_with_ttl("old", |_| {}, SubscriptionFilter::all(), Duration::ZERO)
        .unwrap();

    hub.subscribe("new", |_| {}, SubscriptionFilter::all()).unwrap();
    assert_eq!(hub.subscriber_count(), 1);
}

#[test]
fn test_prune_expired_reports_count() {
    let hub = RealtimeHub::create(inline_config()).unwrap();
    hub.subscribe("keeper", |_| {}, SubscriptionFilter::all()).unwrap();
    for i in 0..3 {
        hub.subscribe_with_ttl(format!("s{}", i), |_| {}, SubscriptionFilter::all(), Duration::ZERO)
            .unwrap();
    }

    // The last TTL registration prunes the earlier ones when it subscribes.
    assert_eq!(hub.prune_expired(), 1);
    assert_eq!(hub.subscriber_count(), 1);
}

// --- Overflow ---

#[test]
fn test_drop_event_policy_keeps_subscriber() {
    let hub = RealtimeHub::create(
        HubConfig::default()
            .with_buffer_size(1)
            .with_overflow(OverflowPolicy::DropEvent),
    )
    .unwrap();
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    hub.subscribe(
        "slow",
        move |_| {
            let _ = release_rx.recv_timeout(Duration::from_secs(2));
        },
        SubscriptionFilter::all(),
    )
    .unwrap();

    for _ in 0..10 {
        hub.broadcast(EventInput::new("A", "m", json!({})));
    }

    assert_eq!(hub.subscriber_count(), 1);
    assert_eq!(hub.history_len(), 10);
    drop(release_tx);
}

// --- Identity ---

#[test]
fn test_admin_unsubscribe_by_id() {
    let hub = RealtimeHub::create(inline_config()).unwrap();
    let handle = hub.subscribe("a", |_| {}, SubscriptionFilter::all()).unwrap();

    assert!(hub.unsubscribe(&SubscriberId::new("a")));
    assert!(!hub.unsubscribe(&SubscriberId::new("a")));
    assert!(!handle.unsubscribe());
}

#[test]
fn test_stale_handle_after_replacement() {
    let hub = RealtimeHub::create(inline_config()).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    let stale = hub.subscribe("dup", |_| {}, SubscriptionFilter::all()).unwrap();
    hub.subscribe(
        "dup",
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        SubscriptionFilter::all(),
    )
    .unwrap();

    stale.unsubscribe();
    hub.broadcast(EventInput::new("A", "m", json!({})));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(hub.subscriber_count(), 1);
}

// --- History Edge Cases ---

#[test]
fn test_empty_history_queries() {
    let hub = RealtimeHub::create(inline_config()).unwrap();
    assert!(hub.recent_events(&HistoryQuery::all()).is_empty());
    assert!(hub.active_modules().is_empty());
}

#[test]
fn test_limit_zero_returns_nothing() {
    let hub = RealtimeHub::create(inline_config()).unwrap();
    hub.broadcast(EventInput::new("A", "m", json!({})));
    assert!(hub.recent_events(&HistoryQuery::all().limit(0)).is_empty());
}

#[test]
fn test_clear_history_keeps_subscribers() {
    let hub = RealtimeHub::create(inline_config()).unwrap();
    hub.subscribe("a", |_| {}, SubscriptionFilter::all()).unwrap();
    hub.broadcast(EventInput::new("A", "m", json!({})));

    hub.clear_history();
    assert_eq!(hub.history_len(), 0);
    assert_eq!(hub.subscriber_count(), 1);
}

// --- Lifecycle ---

#[test]
fn test_shutdown_is_idempotent() {
    let hub = RealtimeHub::create(HubConfig::default()).unwrap();
    hub.subscribe("a", |_| {}, SubscriptionFilter::all()).unwrap();

    hub.shutdown();
    hub.shutdown();
    assert!(hub.is_shut_down());
    assert_eq!(hub.subscriber_count(), 0);
}
