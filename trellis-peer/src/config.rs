use std::time::Duration;
use trellis_core::ParticipantId;

/// Settings for one collaboration session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL of the signaling relay, e.g. `ws://host:8080/ws`.
    pub relay_url: String,
    /// Identity announced to the relay. Must be unique within the session.
    pub local_id: ParticipantId,
    /// Delay between relay reconnect attempts. The transport retries forever.
    pub reconnect_delay: Duration,
    /// STUN/TURN servers handed to every peer link. Empty means host
    /// candidates only, which is enough on one machine.
    pub ice_servers: Vec<String>,
}

impl SessionConfig {
    pub fn new(relay_url: impl Into<String>, local_id: impl Into<ParticipantId>) -> Self {
        Self {
            relay_url: relay_url.into(),
            local_id: local_id.into(),
            reconnect_delay: Duration::from_secs(5),
            ice_servers: vec!["stun:stun.l.google.com:19302".to_owned()],
        }
    }
}
