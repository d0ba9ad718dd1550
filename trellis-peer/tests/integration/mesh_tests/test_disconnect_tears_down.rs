use trellis_core::{AppMessage, LinkState};
use trellis_peer::{EventKind, SessionEvent};

use crate::integration::init_tracing;
use crate::utils::{
    CONNECT_TIMEOUT_MS, EVENT_TIMEOUT_MS, EventCollector, SILENCE_WINDOW_MS, connect_pair,
    send_until_data, spawn_relay,
};

#[tokio::test]
async fn test_disconnect_tears_down() {
    init_tracing();

    let relay = spawn_relay().await;
    let (alice, bob) = connect_pair(relay, "alice", "bob")
        .await
        .expect("Pair never connected");

    let alice_events = EventCollector::new();
    alice_events.attach(
        &alice,
        &[
            EventKind::ConnectionStateChange,
            EventKind::PeerConnected,
            EventKind::PeerDisconnected,
            EventKind::Data,
        ],
    );
    let bob_events = EventCollector::new();
    bob_events.attach(&bob, &[EventKind::Data]);

    // Prove the channel is live before tearing it down.
    let probe = AppMessage::chat("probe");
    send_until_data(&alice, &probe, &bob_events)
        .await
        .expect("Channel never opened");

    alice.disconnect("bob").await.expect("Disconnect failed");

    alice_events
        .wait_for(EVENT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::ConnectionStateChange { peer, state }
                if peer.as_str() == "bob" && *state == LinkState::Closed)
        })
        .await
        .expect("No closed state change");
    alice_events
        .wait_for(EVENT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::PeerDisconnected { peer } if peer.as_str() == "bob")
        })
        .await
        .expect("No peer disconnected event");

    // The channel is gone on alice's side; bob's sends no longer land.
    bob.send(&AppMessage::chat("into the void")).await;
    alice_events
        .expect_none(SILENCE_WINDOW_MS, |e| {
            matches!(e, SessionEvent::Data { .. })
        })
        .await
        .expect("Data arrived after disconnect");

    // A closed peer can be dialed again from scratch.
    alice.connect("bob").await.expect("Reconnect failed");
    alice_events
        .wait_for(CONNECT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::PeerConnected { peer } if peer.as_str() == "bob")
        })
        .await
        .expect("Second negotiation never completed");

    let again = AppMessage::chat("back again");
    send_until_data(&alice, &again, &bob_events)
        .await
        .expect("Chat after reconnect never arrived");

    alice.close().await;
    bob.close().await;
}
