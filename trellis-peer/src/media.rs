use std::collections::HashMap;
use std::sync::Arc;
use trellis_core::ParticipantId;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// One outgoing track plus the per-peer senders it is attached through.
/// Senders are retained so the track can be detached again on stop.
pub struct MediaTrack {
    pub track: Arc<TrackLocalStaticSample>,
    pub senders: HashMap<ParticipantId, Arc<RTCRtpSender>>,
}

impl MediaTrack {
    pub fn new(track: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            track,
            senders: HashMap::new(),
        }
    }
}

/// Local outgoing media owned by the peer manager: at most one audio track
/// and one screen track at a time.
#[derive(Default)]
pub struct LocalMedia {
    audio: Option<MediaTrack>,
    screen: Option<MediaTrack>,
}

impl LocalMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample-writer track announcing Opus audio.
    pub fn audio_track() -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "trellis-media".to_owned(),
        ))
    }

    /// Sample-writer track announcing VP8 video for screen capture.
    pub fn screen_track() -> Arc<TrackLocalStaticSample> {
        Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "screen".to_owned(),
            "trellis-media".to_owned(),
        ))
    }

    pub fn audio(&self) -> Option<&MediaTrack> {
        self.audio.as_ref()
    }

    pub fn audio_mut(&mut self) -> Option<&mut MediaTrack> {
        self.audio.as_mut()
    }

    pub fn set_audio(&mut self, media: MediaTrack) {
        self.audio = Some(media);
    }

    pub fn take_audio(&mut self) -> Option<MediaTrack> {
        self.audio.take()
    }

    pub fn screen(&self) -> Option<&MediaTrack> {
        self.screen.as_ref()
    }

    pub fn screen_mut(&mut self) -> Option<&mut MediaTrack> {
        self.screen.as_mut()
    }

    pub fn set_screen(&mut self, media: MediaTrack) {
        self.screen = Some(media);
    }

    pub fn take_screen(&mut self) -> Option<MediaTrack> {
        self.screen.take()
    }

    /// Drops any senders retained for a departed peer. The peer connection
    /// is already gone; there is nothing to detach.
    pub fn forget_peer(&mut self, peer: &ParticipantId) {
        if let Some(media) = self.audio.as_mut() {
            media.senders.remove(peer);
        }
        if let Some(media) = self.screen.as_mut() {
            media.senders.remove(peer);
        }
    }

    pub fn clear(&mut self) {
        self.audio = None;
        self.screen = None;
    }
}
