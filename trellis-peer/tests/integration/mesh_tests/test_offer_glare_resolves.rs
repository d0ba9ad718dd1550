use std::time::Duration;

use trellis_core::AppMessage;
use trellis_peer::{EventKind, SessionEvent};

use crate::integration::init_tracing;
use crate::utils::{
    CONNECT_TIMEOUT_MS, EVENT_TIMEOUT_MS, EventCollector, open_session, send_until_data,
    spawn_relay,
};

/// Both sides dial at once. The participant with the smaller id abandons its
/// own offer and answers the other, so exactly one link survives per side.
#[tokio::test]
async fn test_offer_glare_resolves() {
    init_tracing();

    let relay = spawn_relay().await;

    let alice = open_session(relay, "alice");
    let bob = open_session(relay, "bob");

    let alice_events = EventCollector::new();
    alice_events.attach(
        &alice,
        &[EventKind::ParticipantList, EventKind::PeerConnected, EventKind::Data],
    );
    let bob_events = EventCollector::new();
    bob_events.attach(
        &bob,
        &[EventKind::ParticipantList, EventKind::PeerConnected, EventKind::Data],
    );

    let full_roster = |e: &SessionEvent| {
        matches!(e, SessionEvent::ParticipantList { participants } if participants.len() == 2)
    };
    alice_events
        .wait_for(EVENT_TIMEOUT_MS, full_roster)
        .await
        .expect("Alice roster incomplete");
    bob_events
        .wait_for(EVENT_TIMEOUT_MS, full_roster)
        .await
        .expect("Bob roster incomplete");

    // Simultaneous dials: the offers cross on the relay.
    alice.connect("bob").await.expect("Alice connect failed");
    bob.connect("alice").await.expect("Bob connect failed");

    alice_events
        .wait_for(CONNECT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::PeerConnected { peer } if peer.as_str() == "bob")
        })
        .await
        .expect("Alice never connected");
    bob_events
        .wait_for(CONNECT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::PeerConnected { peer } if peer.as_str() == "alice")
        })
        .await
        .expect("Bob never connected");

    // Let any duplicate negotiation surface before counting.
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(
        alice_events.count(|e| matches!(e, SessionEvent::PeerConnected { .. })),
        1,
        "Alice saw more than one link come up"
    );
    assert_eq!(
        bob_events.count(|e| matches!(e, SessionEvent::PeerConnected { .. })),
        1,
        "Bob saw more than one link come up"
    );

    // The surviving channel carries data both ways.
    let ping = AppMessage::chat("ping");
    send_until_data(&alice, &ping, &bob_events)
        .await
        .expect("Ping never arrived");

    let pong = AppMessage::chat("pong");
    send_until_data(&bob, &pong, &alice_events)
        .await
        .expect("Pong never arrived");

    alice.close().await;
    bob.close().await;
}
