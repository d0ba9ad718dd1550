use crate::integration::init_tracing;
use crate::utils::{RelayClient, spawn_relay};

#[tokio::test]
async fn test_disconnect_updates_roster() {
    init_tracing();

    let addr = spawn_relay().await;

    let mut alice = RelayClient::register(addr, "alice")
        .await
        .expect("Failed to register alice");
    let bob = RelayClient::register(addr, "bob")
        .await
        .expect("Failed to register bob");

    alice
        .wait_for_roster(&["alice", "bob"])
        .await
        .expect("Alice never saw bob join");

    bob.close().await.expect("Failed to close bob");

    alice
        .wait_for_roster(&["alice"])
        .await
        .expect("Alice never saw bob leave");
}
