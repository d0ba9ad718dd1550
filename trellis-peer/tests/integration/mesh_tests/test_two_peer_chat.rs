use trellis_core::AppMessage;
use trellis_peer::{EventKind, SessionEvent};

use crate::integration::init_tracing;
use crate::utils::{EventCollector, connect_pair, send_until_data, spawn_relay};

#[tokio::test]
async fn test_two_peer_chat() {
    init_tracing();

    let relay = spawn_relay().await;
    let (alice, bob) = connect_pair(relay, "alice", "bob")
        .await
        .expect("Pair never connected");

    let bob_events = EventCollector::new();
    bob_events.attach(&bob, &[EventKind::Data]);

    let chat = AppMessage::chat("hello bob");
    let event = send_until_data(&alice, &chat, &bob_events)
        .await
        .expect("Chat never arrived");

    match event {
        SessionEvent::Data { from, message } => {
            assert_eq!(from.as_str(), "alice");
            assert_eq!(message, chat);
        }
        other => panic!("Unexpected event: {:?}", other),
    }

    // And the other direction over the same channel.
    let alice_events = EventCollector::new();
    alice_events.attach(&alice, &[EventKind::Data]);

    let reply = AppMessage::chat("hello alice");
    let event = send_until_data(&bob, &reply, &alice_events)
        .await
        .expect("Reply never arrived");

    match event {
        SessionEvent::Data { from, message } => {
            assert_eq!(from.as_str(), "bob");
            assert_eq!(message, reply);
        }
        other => panic!("Unexpected event: {:?}", other),
    }

    alice.close().await;
    bob.close().await;
}
