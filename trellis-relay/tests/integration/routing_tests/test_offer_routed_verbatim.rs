use crate::integration::init_tracing;
use crate::utils::{FRAME_TIMEOUT_MS, RelayClient, spawn_relay};

#[tokio::test]
async fn test_offer_routed_verbatim() {
    init_tracing();

    let addr = spawn_relay().await;

    let mut alice = RelayClient::register(addr, "alice")
        .await
        .expect("Failed to register alice");
    let mut bob = RelayClient::register(addr, "bob")
        .await
        .expect("Failed to register bob");

    alice
        .wait_for_roster(&["alice", "bob"])
        .await
        .expect("Alice never saw bob join");

    // Fields the relay does not model must survive the hop untouched.
    let raw = concat!(
        r#"{"kind":"offer","payload":{"sdp":"v=0\r\n","trickle":true},"#,
        r#""from":"bob","to":"alice","session":"x1"}"#,
    );
    bob.send_text(raw).await.expect("Failed to send offer");

    let received = alice
        .next_text(FRAME_TIMEOUT_MS)
        .await
        .expect("Alice never got the offer");
    assert_eq!(received, raw);
}
