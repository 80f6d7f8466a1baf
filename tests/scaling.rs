//! Scaling tests with many subscribers and concurrent broadcasters.
//!
//! Checks that ordering guarantees hold when several threads broadcast
//! at once and that fan-out stays correct at a few hundred subscribers.

use aivent_realtime::{EventInput, HistoryQuery, HubConfig, RealtimeHub, SubscriptionFilter};
use crossbeam_channel::unbounded;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SUBSCRIBERS: usize = 200;
const PRODUCERS: usize = 4;
const EVENTS_PER_PRODUCER: usize = 250;

/// Timing helper
struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    fn report(&self) {
        println!(
            "  {} took {:.2}ms",
            self.name,
            self.start.elapsed().as_secs_f64() * 1000.0
        );
    }
}

#[test]
fn test_concurrent_broadcast_order_matches_history() {
    let hub = RealtimeHub::create(
        HubConfig::default()
            .with_max_history(10_000)
            .with_buffer_size(4096),
    )
    .unwrap();
    let (tx, rx) = unbounded();
    hub.subscribe(
        "observer",
        move |event| {
            let _ = tx.send(event);
        },
        SubscriptionFilter::all(),
    )
    .unwrap();

    let timer = Timer::new("concurrent broadcast");
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let hub = Arc::clone(&hub);
            thread::spawn(move || {
                for i in 0..EVENTS_PER_PRODUCER {
                    hub.broadcast(EventInput::new("T", format!("p{}", p), json!(i)));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    timer.report();

    let total = PRODUCERS * EVENTS_PER_PRODUCER;
    let delivered: Vec<_> = (0..total)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    let history = hub.recent_events(&HistoryQuery::all());

    assert_eq!(history.len(), total);
    assert_eq!(delivered, history);

    // Each producer's own events keep their relative order.
    for p in 0..PRODUCERS {
        let module = format!("p{}", p);
        let seq: Vec<u64> = history
            .iter()
            .filter(|e| e.module == module)
            .map(|e| e.data.as_u64().unwrap())
            .collect();
        assert_eq!(seq, (0..EVENTS_PER_PRODUCER as u64).collect::<Vec<_>>());
    }
}

#[test]
fn test_fan_out_to_many_subscribers() {
    let hub = RealtimeHub::create(HubConfig::default()).unwrap();
    let (tx, rx) = unbounded();

    let timer = Timer::new("subscribe");
    for i in 0..SUBSCRIBERS {
        let tx = tx.clone();
        let module = if i % 2 == 0 { "orders" } else { "tickets" };
        hub.subscribe(
            format!("sub-{}", i),
            move |event| {
                let _ = tx.send((i, event.module.clone()));
            },
            SubscriptionFilter::modules([module]),
        )
        .unwrap();
    }
    timer.report();
    assert_eq!(hub.subscriber_count(), SUBSCRIBERS);

    let timer = Timer::new("broadcast");
    hub.broadcast(EventInput::new("ORDER_COMPLETED", "orders", json!({})));
    timer.report();

    let mut hits: Vec<usize> = (0..SUBSCRIBERS / 2)
        .map(|_| {
            let (i, module) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(module, "orders");
            i
        })
        .collect();
    hits.sort_unstable();
    assert_eq!(hits, (0..SUBSCRIBERS).step_by(2).collect::<Vec<_>>());
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    hub.shutdown();
    assert_eq!(hub.subscriber_count(), 0);
}

#[test]
fn test_subscribe_churn_during_broadcast() {
    let hub = RealtimeHub::create(HubConfig::default()).unwrap();

    let broadcaster = {
        let hub = Arc::clone(&hub);
        thread::spawn(move || {
            for i in 0..500 {
                hub.broadcast(EventInput::new("T", "m", json!(i)));
            }
        })
    };

    for i in 0..100 {
        let handle = hub
            .subscribe(format!("churn-{}", i % 10), |_| {}, SubscriptionFilter::all())
            .unwrap();
        if i % 3 == 0 {
            handle.unsubscribe();
        }
    }

    broadcaster.join().unwrap();
    assert!(hub.subscriber_count() <= 10);
    assert_eq!(hub.history_len(), 500);
}
