use crate::error::SessionError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use trellis_core::{CandidatePayload, LinkState, ParticipantId};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Callbacks on the underlying connection funnel into the manager loop
/// through these.
pub enum LinkEvent {
    StateChanged(ParticipantId, RTCPeerConnectionState),
    CandidateReady(ParticipantId, CandidatePayload),
    ChannelOpen(ParticipantId, Arc<RTCDataChannel>),
    ChannelClosed(ParticipantId),
    ChannelMessage(ParticipantId, DataChannelMessage),
    TrackReceived(ParticipantId, Arc<TrackRemote>),
}

/// One negotiated connection to one remote participant.
///
/// The manager is the only writer: it drives the offer/answer dance, owns
/// the [`LinkState`], and stages remote candidates that arrive before the
/// remote description is applied.
pub struct PeerLink {
    remote: ParticipantId,
    peer_connection: Arc<RTCPeerConnection>,
    state: LinkState,
    remote_description_set: bool,
    staged_candidates: Vec<CandidatePayload>,
}

impl PeerLink {
    pub async fn new(
        remote: ParticipantId,
        ice_servers: &[String],
        event_tx: mpsc::Sender<LinkEvent>,
    ) -> Result<Self, SessionError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_ice_servers = if ice_servers.is_empty() {
            vec![]
        } else {
            vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }]
        };

        let rtc_config = RTCConfiguration {
            ice_servers: rtc_ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_tx = event_tx.clone();
        let remote_state = remote.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let remote = remote_state.clone();

                Box::pin(async move {
                    info!("Connection state for {:?}: {:?}", remote, state);
                    let _ = tx.send(LinkEvent::StateChanged(remote, state)).await;
                })
            },
        ));

        let ice_tx = event_tx.clone();
        let remote_ice = remote.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let remote = remote_ice.clone();

            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx
                    .send(LinkEvent::CandidateReady(remote, payload_from_init(init)))
                    .await;
            })
        }));

        let dc_tx = event_tx.clone();
        let remote_dc = remote.clone();
        peer_connection.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            let tx = dc_tx.clone();
            let remote = remote_dc.clone();

            Box::pin(async move {
                debug!("Data channel '{}' announced by {:?}", channel.label(), remote);
                wire_data_channel(&channel, remote, tx);
            })
        }));

        let track_tx = event_tx.clone();
        let remote_track = remote.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = track_tx.clone();
            let remote = remote_track.clone();

            Box::pin(async move {
                info!("Remote track from {:?}: {}", remote, track.codec().capability.mime_type);
                let _ = tx.send(LinkEvent::TrackReceived(remote, track)).await;
            })
        }));

        Ok(Self {
            remote,
            peer_connection,
            state: LinkState::New,
            remote_description_set: false,
            staged_candidates: Vec::new(),
        })
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Returns whether the state actually changed.
    pub fn set_state(&mut self, state: LinkState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        true
    }

    /// Creates the data channel on the initiating side. The responder gets
    /// its channel through `on_data_channel` instead.
    pub async fn create_data_channel(
        &self,
        event_tx: mpsc::Sender<LinkEvent>,
    ) -> Result<(), SessionError> {
        let channel = self
            .peer_connection
            .create_data_channel("data", None)
            .await?;
        wire_data_channel(&channel, self.remote.clone(), event_tx);
        Ok(())
    }

    /// Builds the local offer and installs it as the local description.
    pub async fn offer(&self) -> Result<String, SessionError> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    /// Applies a remote offer and produces the local answer.
    pub async fn answer_to(&mut self, sdp: String) -> Result<String, SessionError> {
        let offer = RTCSessionDescription::offer(sdp)?;
        self.peer_connection.set_remote_description(offer).await?;
        self.remote_description_set = true;
        self.drain_staged().await;

        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    /// Applies the remote answer to our earlier offer.
    pub async fn apply_answer(&mut self, sdp: String) -> Result<(), SessionError> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.peer_connection.set_remote_description(answer).await?;
        self.remote_description_set = true;
        self.drain_staged().await;
        Ok(())
    }

    /// Applies a trickle candidate, or stages it until the remote
    /// description lands.
    pub async fn add_candidate(&mut self, candidate: CandidatePayload) -> Result<(), SessionError> {
        if !self.remote_description_set {
            debug!("Staging candidate from {:?} until the description is set", self.remote);
            self.staged_candidates.push(candidate);
            return Ok(());
        }

        self.peer_connection
            .add_ice_candidate(init_from_payload(candidate))
            .await?;
        Ok(())
    }

    async fn drain_staged(&mut self) {
        for candidate in std::mem::take(&mut self.staged_candidates) {
            if let Err(e) = self
                .peer_connection
                .add_ice_candidate(init_from_payload(candidate))
                .await
            {
                debug!("Staged candidate for {:?} rejected: {}", self.remote, e);
            }
        }
    }

    pub async fn attach_track(
        &self,
        track: Arc<TrackLocalStaticSample>,
    ) -> Result<Arc<RTCRtpSender>, SessionError> {
        let track: Arc<dyn TrackLocal + Send + Sync> = track;
        let sender = self.peer_connection.add_track(track).await?;
        Ok(sender)
    }

    pub async fn remove_sender(&self, sender: &Arc<RTCRtpSender>) -> Result<(), SessionError> {
        self.peer_connection.remove_track(sender).await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<(), SessionError> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

fn wire_data_channel(
    channel: &Arc<RTCDataChannel>,
    remote: ParticipantId,
    event_tx: mpsc::Sender<LinkEvent>,
) {
    let open_channel = channel.clone();
    let open_tx = event_tx.clone();
    let remote_open = remote.clone();
    channel.on_open(Box::new(move || {
        let tx = open_tx.clone();
        let remote = remote_open.clone();
        let channel = open_channel.clone();

        Box::pin(async move {
            info!("Data channel open with {:?}", remote);
            let _ = tx.send(LinkEvent::ChannelOpen(remote, channel)).await;
        })
    }));

    let message_tx = event_tx.clone();
    let remote_message = remote.clone();
    channel.on_message(Box::new(move |message: DataChannelMessage| {
        let tx = message_tx.clone();
        let remote = remote_message.clone();

        Box::pin(async move {
            let _ = tx.send(LinkEvent::ChannelMessage(remote, message)).await;
        })
    }));

    let close_tx = event_tx;
    channel.on_close(Box::new(move || {
        let tx = close_tx.clone();
        let remote = remote.clone();

        Box::pin(async move {
            debug!("Data channel closed with {:?}", remote);
            let _ = tx.send(LinkEvent::ChannelClosed(remote)).await;
        })
    }));
}

fn payload_from_init(init: RTCIceCandidateInit) -> CandidatePayload {
    CandidatePayload {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
    }
}

fn init_from_payload(payload: CandidatePayload) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: payload.candidate,
        sdp_mid: payload.sdp_mid,
        sdp_mline_index: payload.sdp_m_line_index,
        ..Default::default()
    }
}
