use trellis_core::AppMessage;
use trellis_peer::{EventKind, SessionEvent};

use crate::integration::init_tracing;
use crate::utils::{
    EVENT_TIMEOUT_MS, EventCollector, connect_pair, send_until_data, spawn_relay,
};

/// Starting and stopping a screen share is announced over the data channels
/// and surfaces as a dedicated event on the far side.
#[tokio::test]
async fn test_screen_share_announced() {
    init_tracing();

    let relay = spawn_relay().await;
    let (alice, bob) = connect_pair(relay, "alice", "bob")
        .await
        .expect("Pair never connected");

    let alice_events = EventCollector::new();
    alice_events.attach(&alice, &[EventKind::ScreenShare]);
    let bob_events = EventCollector::new();
    bob_events.attach(&bob, &[EventKind::ScreenShare, EventKind::Data]);

    // Make sure the channel is open before announcing over it.
    let probe = AppMessage::chat("probe");
    send_until_data(&alice, &probe, &bob_events)
        .await
        .expect("Channel never opened");

    alice
        .start_screen_share()
        .await
        .expect("Screen share start failed");

    // The sharer sees its own announcement locally.
    alice_events
        .wait_for(EVENT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::ScreenShare { active: true, .. })
        })
        .await
        .expect("No local screen share event");

    let event = bob_events
        .wait_for(EVENT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::ScreenShare { active: true, .. })
        })
        .await
        .expect("Screen share start never announced");
    match event {
        SessionEvent::ScreenShare { from, active } => {
            assert_eq!(from.as_str(), "alice");
            assert!(active);
        }
        other => panic!("Unexpected event: {:?}", other),
    }

    alice
        .stop_screen_share()
        .await
        .expect("Screen share stop failed");

    let event = bob_events
        .wait_for(EVENT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::ScreenShare { active: false, .. })
        })
        .await
        .expect("Screen share stop never announced");
    match event {
        SessionEvent::ScreenShare { from, active } => {
            assert_eq!(from.as_str(), "alice");
            assert!(!active);
        }
        other => panic!("Unexpected event: {:?}", other),
    }

    alice.close().await;
    bob.close().await;
}
