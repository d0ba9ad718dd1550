use std::time::{Duration, Instant};

use trellis_peer::{EventKind, SessionEvent};

use crate::integration::init_tracing;
use crate::utils::{EVENT_TIMEOUT_MS, EventCollector, KillableRelay, open_session, spawn_relay_at};

#[tokio::test]
async fn test_reconnect_after_relay_loss() {
    init_tracing();

    let mut relay = KillableRelay::spawn();
    let session = open_session(relay.addr, "alice");

    let events = EventCollector::new();
    events.attach(
        &session,
        &[
            EventKind::SignalingOpen,
            EventKind::SignalingClosed,
            EventKind::ParticipantList,
        ],
    );

    events
        .wait_for(EVENT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::SignalingOpen)
        })
        .await
        .expect("Initial connection failed");

    relay.kill();

    events
        .wait_for(EVENT_TIMEOUT_MS, |e| {
            matches!(e, SessionEvent::SignalingClosed)
        })
        .await
        .expect("Connection loss never surfaced");

    spawn_relay_at(relay.addr).await;

    // The transport retries on its own: a second open and a fresh roster
    // prove it registered again without help.
    let start = Instant::now();
    loop {
        let opens = events.count(|e| matches!(e, SessionEvent::SignalingOpen));
        let rosters = events.count(|e| {
            matches!(e, SessionEvent::ParticipantList { participants }
                if participants.iter().any(|p| p.as_str() == "alice"))
        });
        if opens >= 2 && rosters >= 2 {
            break;
        }
        if start.elapsed() > Duration::from_millis(EVENT_TIMEOUT_MS) {
            panic!("Never re-registered after relay restart");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    session.close().await;
}
