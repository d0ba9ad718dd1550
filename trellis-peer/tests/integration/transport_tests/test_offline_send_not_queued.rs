use std::time::Duration;

use trellis_peer::{EventKind, SessionEvent};

use crate::integration::init_tracing;
use crate::utils::{
    EVENT_TIMEOUT_MS, EventCollector, SILENCE_WINDOW_MS, open_session, reserve_addr,
    spawn_relay_at,
};

#[tokio::test]
async fn test_offline_send_not_queued() {
    init_tracing();

    let addr = reserve_addr().await;

    let alice = open_session(addr, "alice");
    let alice_events = EventCollector::new();
    alice_events.attach(&alice, &[EventKind::SignalingOpen]);

    // A few dial attempts fail while nothing is listening.
    tokio::time::sleep(Duration::from_millis(350)).await;

    // The offer produced by this connect has no transport and is dropped.
    alice.connect("bob").await.expect("Connect failed");
    tokio::time::sleep(Duration::from_millis(100)).await;

    spawn_relay_at(addr).await;

    let bob = open_session(addr, "bob");
    let bob_events = EventCollector::new();
    bob_events.attach(&bob, &[EventKind::ConnectionStateChange]);

    alice_events
        .wait_for(EVENT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::SignalingOpen)
        })
        .await
        .expect("Alice never reached the relay");

    // Nothing was replayed after reconnecting: bob sees no negotiation.
    bob_events
        .expect_none(SILENCE_WINDOW_MS, |e| {
            matches!(e, SessionEvent::ConnectionStateChange { .. })
        })
        .await
        .expect("A stale offer reached bob");

    alice.close().await;
    bob.close().await;
}
