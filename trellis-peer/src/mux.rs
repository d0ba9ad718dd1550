use crate::events::{EventBus, SessionEvent};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};
use trellis_core::{AppMessage, ParticipantId};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;

/// One logical send/receive surface over all per-link data channels.
///
/// The channel map is written by the peer manager on open/close events and
/// read here for fan-out, so sends never wait on the manager loop.
pub struct ChannelMux {
    channels: DashMap<ParticipantId, Arc<RTCDataChannel>>,
    bus: Arc<EventBus>,
}

impl ChannelMux {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            channels: DashMap::new(),
            bus,
        }
    }

    pub fn attach(&self, peer: ParticipantId, channel: Arc<RTCDataChannel>) {
        self.channels.insert(peer, channel);
    }

    pub fn detach(&self, peer: &ParticipantId) {
        self.channels.remove(peer);
    }

    /// Serializes once and fans out to every channel currently open. Links
    /// still negotiating or already torn down are skipped silently; nothing
    /// is queued for them.
    pub async fn broadcast(&self, message: &AppMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} message: {}", message.kind(), e);
                return;
            }
        };

        // send_text awaits and the map iterator holds a shard guard, so the
        // open channels are collected first. Attach and detach from the
        // manager are free to run while the sends are in flight.
        let open: Vec<(ParticipantId, Arc<RTCDataChannel>)> = self
            .channels
            .iter()
            .filter(|entry| entry.value().ready_state() == RTCDataChannelState::Open)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (peer, channel) in open {
            if let Err(e) = channel.send_text(json.clone()).await {
                debug!("Send to {:?} failed: {}", peer, e);
            }
        }
    }

    /// Routes one inbound data-channel message onto the event bus. Known
    /// message types arrive typed; unknown types keep their raw value.
    /// Anything that is not a JSON text frame is dropped here.
    pub fn dispatch(&self, from: ParticipantId, message: &DataChannelMessage) {
        if !message.is_string {
            debug!("Binary frame from {:?} dropped ({} bytes)", from, message.data.len());
            return;
        }

        let text = match std::str::from_utf8(&message.data) {
            Ok(text) => text,
            Err(_) => {
                warn!("Non-UTF8 text frame from {:?} dropped", from);
                return;
            }
        };

        let app: AppMessage = match serde_json::from_str(text) {
            Ok(app) => app,
            Err(e) => {
                warn!("Dropping malformed data message from {:?}: {}", from, e);
                return;
            }
        };

        self.bus.emit(&SessionEvent::Data {
            from: from.clone(),
            message: app.clone(),
        });

        match app {
            AppMessage::ScreenShare(share) => self.bus.emit(&SessionEvent::ScreenShare {
                from,
                active: share.active,
            }),
            AppMessage::MeetingLog(entry) => {
                self.bus.emit(&SessionEvent::MeetingLog { from, entry })
            }
            AppMessage::AiSuggestion(suggestion) => {
                self.bus.emit(&SessionEvent::AiSuggestion { from, suggestion })
            }
            _ => {}
        }
    }
}
