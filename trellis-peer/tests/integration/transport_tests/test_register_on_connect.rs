use trellis_peer::{EventKind, SessionEvent};

use crate::integration::init_tracing;
use crate::utils::{EVENT_TIMEOUT_MS, EventCollector, open_session, spawn_relay};

#[tokio::test]
async fn test_register_on_connect() {
    init_tracing();

    let relay = spawn_relay().await;
    let session = open_session(relay, "alice");

    let events = EventCollector::new();
    events.attach(
        &session,
        &[EventKind::SignalingOpen, EventKind::ParticipantList],
    );

    events
        .wait_for(EVENT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::SignalingOpen)
        })
        .await
        .expect("Transport never came up");

    // Registration happened without any explicit call: the roster lists us.
    let roster = events
        .wait_for(EVENT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::ParticipantList { participants }
                if participants.iter().any(|p| p.as_str() == "alice"))
        })
        .await
        .expect("Roster never listed alice");

    match roster {
        SessionEvent::ParticipantList { participants } => {
            assert_eq!(participants.len(), 1);
        }
        other => panic!("Unexpected event: {:?}", other),
    }

    session.close().await;
}
