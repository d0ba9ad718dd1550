use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{EventBus, SessionEvent};
use crate::link::{LinkEvent, PeerLink};
use crate::media::{LocalMedia, MediaTrack};
use crate::mux::ChannelMux;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use trellis_core::{CandidatePayload, LinkState, ParticipantId, SignalEnvelope};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Outbound lane for signaling envelopes. The transport implements it;
/// tests substitute a capture.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn send(&self, envelope: SignalEnvelope);
}

pub enum PeerCommand {
    Connect {
        remote: ParticipantId,
    },
    Disconnect {
        remote: ParticipantId,
    },
    SignalingOpen,
    SignalingClosed,
    Roster {
        participants: Vec<ParticipantId>,
    },
    RemoteOffer {
        from: ParticipantId,
        sdp: String,
    },
    RemoteAnswer {
        from: ParticipantId,
        sdp: String,
    },
    RemoteCandidate {
        from: ParticipantId,
        candidate: CandidatePayload,
    },
    StartAudio {
        reply: oneshot::Sender<Result<Arc<TrackLocalStaticSample>, SessionError>>,
    },
    StopAudio {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StartScreen {
        reply: oneshot::Sender<Result<Arc<TrackLocalStaticSample>, SessionError>>,
    },
    StopScreen {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

const MAX_PENDING_PEERS: usize = 32;
const MAX_PENDING_PER_PEER: usize = 16;

/// Candidates that arrived before any link existed for their sender.
/// Bounded both ways; the oldest entry gives way when a cap is hit.
#[derive(Default)]
struct PendingCandidates {
    order: VecDeque<ParticipantId>,
    by_peer: HashMap<ParticipantId, Vec<CandidatePayload>>,
}

impl PendingCandidates {
    fn push(&mut self, peer: ParticipantId, candidate: CandidatePayload) {
        if !self.by_peer.contains_key(&peer) {
            if self.order.len() >= MAX_PENDING_PEERS {
                if let Some(evicted) = self.order.pop_front() {
                    debug!("Pending candidate pool full, evicting {:?}", evicted);
                    self.by_peer.remove(&evicted);
                }
            }
            self.order.push_back(peer.clone());
        }

        let list = self.by_peer.entry(peer).or_default();
        if list.len() >= MAX_PENDING_PER_PEER {
            list.remove(0);
        }
        list.push(candidate);
    }

    fn take(&mut self, peer: &ParticipantId) -> Vec<CandidatePayload> {
        self.order.retain(|p| p != peer);
        self.by_peer.remove(peer).unwrap_or_default()
    }

    /// Drops buffered candidates from peers no longer in the roster.
    fn retain_known(&mut self, roster: &[ParticipantId]) {
        self.order.retain(|p| roster.contains(p));
        self.by_peer.retain(|p, _| roster.contains(p));
    }
}

/// Owner of every peer link. One loop drains facade/transport commands and
/// per-link callback events, so link-map mutations never race.
pub struct PeerManager {
    local_id: ParticipantId,
    ice_servers: Vec<String>,
    links: HashMap<ParticipantId, PeerLink>,
    pending: PendingCandidates,
    media: LocalMedia,
    mux: Arc<ChannelMux>,
    bus: Arc<EventBus>,
    signals: Arc<dyn SignalSink>,
    command_rx: mpsc::Receiver<PeerCommand>,
    link_rx: mpsc::Receiver<LinkEvent>,
    link_tx: mpsc::Sender<LinkEvent>,
}

impl PeerManager {
    pub fn new(
        config: &SessionConfig,
        signals: Arc<dyn SignalSink>,
        mux: Arc<ChannelMux>,
        bus: Arc<EventBus>,
        command_rx: mpsc::Receiver<PeerCommand>,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::channel(256);

        Self {
            local_id: config.local_id.clone(),
            ice_servers: config.ice_servers.clone(),
            links: HashMap::new(),
            pending: PendingCandidates::default(),
            media: LocalMedia::new(),
            mux,
            bus,
            signals,
            command_rx,
            link_rx,
            link_tx,
        }
    }

    pub async fn run(mut self) {
        info!("Peer manager loop started for {:?}", self.local_id);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(PeerCommand::Shutdown { reply }) => {
                            self.shutdown().await;
                            let _ = reply.send(());
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Command channel closed, shutting down peer manager");
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                evt = self.link_rx.recv() => {
                    match evt {
                        Some(e) => self.handle_link_event(e).await,
                        None => {
                            warn!("Link event channel closed unexpectedly");
                            break;
                        }
                    }
                }
            }
        }

        info!("Peer manager loop finished for {:?}", self.local_id);
    }

    async fn handle_command(&mut self, cmd: PeerCommand) {
        match cmd {
            PeerCommand::Connect { remote } => self.connect(remote).await,
            PeerCommand::Disconnect { remote } => self.disconnect(remote).await,
            PeerCommand::SignalingOpen => self.bus.emit(&SessionEvent::SignalingOpen),
            PeerCommand::SignalingClosed => self.bus.emit(&SessionEvent::SignalingClosed),
            PeerCommand::Roster { participants } => self.on_roster(participants),
            PeerCommand::RemoteOffer { from, sdp } => self.on_remote_offer(from, sdp).await,
            PeerCommand::RemoteAnswer { from, sdp } => self.on_remote_answer(from, sdp).await,
            PeerCommand::RemoteCandidate { from, candidate } => {
                self.on_remote_candidate(from, candidate).await
            }
            PeerCommand::StartAudio { reply } => {
                let _ = reply.send(self.start_audio().await);
            }
            PeerCommand::StopAudio { reply } => {
                let _ = reply.send(self.stop_audio().await);
            }
            PeerCommand::StartScreen { reply } => {
                let _ = reply.send(self.start_screen().await);
            }
            PeerCommand::StopScreen { reply } => {
                let _ = reply.send(self.stop_screen().await);
            }
            // run() intercepts Shutdown before dispatch.
            PeerCommand::Shutdown { .. } => {}
        }
    }

    /// The participant with the smaller id abandons its own offer when both
    /// sides offered at once. Both peers compute the same answer from
    /// opposite ends, so exactly one negotiation survives.
    fn yields_to(local: &ParticipantId, remote: &ParticipantId) -> bool {
        local < remote
    }

    async fn connect(&mut self, remote: ParticipantId) {
        if remote == self.local_id {
            warn!("Ignoring connect to self");
            return;
        }

        if let Some(link) = self.links.get(&remote) {
            if link.state().is_live() {
                info!("Connect to {:?} ignored, link is {:?}", remote, link.state());
                return;
            }
            // A dead leftover makes way for the fresh attempt.
            self.remove_link(&remote, false).await;
        }

        info!("Connecting to {:?}", remote);

        let link = match self.create_link(remote.clone()).await {
            Ok(link) => link,
            Err(e) => {
                error!("Failed to create link to {:?}: {}", remote, e);
                return;
            }
        };

        if let Err(e) = link.create_data_channel(self.link_tx.clone()).await {
            error!("Failed to create data channel for {:?}: {}", remote, e);
            let _ = link.close().await;
            return;
        }

        let sdp = match link.offer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                error!("Failed to create offer for {:?}: {}", remote, e);
                let _ = link.close().await;
                return;
            }
        };

        self.install_link(remote.clone(), link).await;
        self.signals
            .send(SignalEnvelope::offer(self.local_id.clone(), remote, sdp))
            .await;
    }

    async fn on_remote_offer(&mut self, from: ParticipantId, sdp: String) {
        if let Some(existing) = self.links.get(&from) {
            if existing.state() == LinkState::Connecting {
                if Self::yields_to(&self.local_id, &from) {
                    info!("Offer glare with {:?}: yielding, answering theirs", from);
                    self.remove_link(&from, false).await;
                } else {
                    info!("Offer glare with {:?}: holding our own offer", from);
                    return;
                }
            } else {
                info!(
                    "Offer from {:?} over a {} link, rebuilding",
                    from,
                    existing.state()
                );
                self.remove_link(&from, true).await;
            }
        }

        let mut link = match self.create_link(from.clone()).await {
            Ok(link) => link,
            Err(e) => {
                error!("Failed to create link for {:?}: {}", from, e);
                return;
            }
        };

        let answer = match link.answer_to(sdp).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("SDP error answering {:?}: {}", from, e);
                let _ = link.close().await;
                return;
            }
        };

        self.install_link(from.clone(), link).await;
        self.signals
            .send(SignalEnvelope::answer(self.local_id.clone(), from, answer))
            .await;
    }

    async fn on_remote_answer(&mut self, from: ParticipantId, sdp: String) {
        let Some(link) = self.links.get_mut(&from) else {
            debug!("Answer from {:?} without a link, dropped", from);
            return;
        };

        if let Err(e) = link.apply_answer(sdp).await {
            error!("Failed to apply answer from {:?}: {}", from, e);
        }
    }

    async fn on_remote_candidate(&mut self, from: ParticipantId, candidate: CandidatePayload) {
        match self.links.get_mut(&from) {
            Some(link) => {
                if let Err(e) = link.add_candidate(candidate).await {
                    warn!("Failed to add candidate from {:?}: {}", from, e);
                }
            }
            None => {
                debug!("Buffering early candidate from {:?}", from);
                self.pending.push(from, candidate);
            }
        }
    }

    fn on_roster(&mut self, participants: Vec<ParticipantId>) {
        self.pending.retain_known(&participants);
        self.bus.emit(&SessionEvent::ParticipantList { participants });
    }

    async fn disconnect(&mut self, remote: ParticipantId) {
        if !self.links.contains_key(&remote) {
            debug!("Disconnect from {:?} without a link", remote);
            return;
        }
        info!("Disconnecting from {:?}", remote);
        self.remove_link(&remote, true).await;
    }

    /// Builds a link with current local media attached, so the tracks ride
    /// in the first offer or answer.
    async fn create_link(&mut self, remote: ParticipantId) -> Result<PeerLink, SessionError> {
        let link = PeerLink::new(remote.clone(), &self.ice_servers, self.link_tx.clone()).await?;

        if let Some(media) = self.media.audio_mut() {
            match link.attach_track(media.track.clone()).await {
                Ok(sender) => {
                    media.senders.insert(remote.clone(), sender);
                }
                Err(e) => warn!("Failed to attach audio to {:?}: {}", remote, e),
            }
        }
        if let Some(media) = self.media.screen_mut() {
            match link.attach_track(media.track.clone()).await {
                Ok(sender) => {
                    media.senders.insert(remote.clone(), sender);
                }
                Err(e) => warn!("Failed to attach screen to {:?}: {}", remote, e),
            }
        }

        Ok(link)
    }

    /// Marks the link connecting, publishes the transition, drains any
    /// candidates buffered before the link existed, and stores it.
    async fn install_link(&mut self, remote: ParticipantId, mut link: PeerLink) {
        link.set_state(LinkState::Connecting);
        self.bus.emit(&SessionEvent::ConnectionStateChange {
            peer: remote.clone(),
            state: LinkState::Connecting,
        });

        for candidate in self.pending.take(&remote) {
            if let Err(e) = link.add_candidate(candidate).await {
                warn!("Buffered candidate for {:?} rejected: {}", remote, e);
            }
        }

        self.links.insert(remote, link);
    }

    async fn remove_link(&mut self, remote: &ParticipantId, publish: bool) {
        let Some(mut link) = self.links.remove(remote) else {
            return;
        };

        self.mux.detach(remote);
        self.media.forget_peer(remote);

        let was_connected = link.state() == LinkState::Connected;
        if let Err(e) = link.close().await {
            debug!("Error closing link to {:?}: {}", remote, e);
        }

        if publish && link.set_state(LinkState::Closed) {
            self.bus.emit(&SessionEvent::ConnectionStateChange {
                peer: remote.clone(),
                state: LinkState::Closed,
            });
            if was_connected {
                self.bus
                    .emit(&SessionEvent::PeerDisconnected { peer: remote.clone() });
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::StateChanged(peer, state) => self.on_rtc_state(peer, state),
            LinkEvent::CandidateReady(peer, candidate) => {
                // Candidates for links we already dropped go nowhere.
                if self.links.contains_key(&peer) {
                    self.signals
                        .send(SignalEnvelope::ice_candidate(
                            self.local_id.clone(),
                            peer,
                            &candidate,
                        ))
                        .await;
                }
            }
            LinkEvent::ChannelOpen(peer, channel) => {
                self.mux.attach(peer, channel);
            }
            LinkEvent::ChannelClosed(peer) => {
                self.mux.detach(&peer);
            }
            LinkEvent::ChannelMessage(peer, message) => self.mux.dispatch(peer, &message),
            LinkEvent::TrackReceived(peer, track) => {
                self.bus.emit(&SessionEvent::RemoteTrack { peer, track });
            }
        }
    }

    fn on_rtc_state(&mut self, peer: ParticipantId, state: RTCPeerConnectionState) {
        let Some(link) = self.links.get_mut(&peer) else {
            return;
        };

        // Closed is always manager initiated and published by remove_link.
        // A Closed callback can only come from an already replaced link, so
        // it must not touch the current one.
        let mapped = match state {
            RTCPeerConnectionState::Connected => LinkState::Connected,
            RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
            RTCPeerConnectionState::Failed => LinkState::Failed,
            _ => return,
        };

        let was = link.state();
        if !link.set_state(mapped) {
            return;
        }

        self.bus.emit(&SessionEvent::ConnectionStateChange {
            peer: peer.clone(),
            state: mapped,
        });

        if mapped == LinkState::Connected {
            self.bus.emit(&SessionEvent::PeerConnected { peer });
        } else if was == LinkState::Connected {
            // Link errors are not retried here. The collaborator decides
            // whether to connect again.
            self.bus
                .emit(&SessionEvent::PeerDisconnected { peer: peer.clone() });
            self.mux.detach(&peer);
        }
    }

    async fn start_audio(&mut self) -> Result<Arc<TrackLocalStaticSample>, SessionError> {
        if self.media.audio().is_some() {
            return Err(SessionError::MediaAlreadyStarted("audio"));
        }

        let track = LocalMedia::audio_track();
        let senders = self.attach_to_live_links(&track).await;
        let mut media = MediaTrack::new(track.clone());
        media.senders = senders;
        self.media.set_audio(media);

        info!("Local audio started");
        Ok(track)
    }

    async fn stop_audio(&mut self) -> Result<(), SessionError> {
        let Some(media) = self.media.take_audio() else {
            return Err(SessionError::MediaNotStarted("audio"));
        };

        self.detach_senders(media.senders).await;
        info!("Local audio stopped");
        Ok(())
    }

    async fn start_screen(&mut self) -> Result<Arc<TrackLocalStaticSample>, SessionError> {
        if self.media.screen().is_some() {
            return Err(SessionError::MediaAlreadyStarted("screen"));
        }

        let track = LocalMedia::screen_track();
        let senders = self.attach_to_live_links(&track).await;
        let mut media = MediaTrack::new(track.clone());
        media.senders = senders;
        self.media.set_screen(media);

        info!("Screen share started");
        Ok(track)
    }

    async fn stop_screen(&mut self) -> Result<(), SessionError> {
        let Some(media) = self.media.take_screen() else {
            return Err(SessionError::MediaNotStarted("screen"));
        };

        self.detach_senders(media.senders).await;
        info!("Screen share stopped");
        Ok(())
    }

    async fn attach_to_live_links(
        &self,
        track: &Arc<TrackLocalStaticSample>,
    ) -> HashMap<ParticipantId, Arc<RTCRtpSender>> {
        let mut senders = HashMap::new();

        for (peer, link) in &self.links {
            if !link.state().is_live() {
                continue;
            }
            match link.attach_track(track.clone()).await {
                Ok(sender) => {
                    senders.insert(peer.clone(), sender);
                }
                Err(e) => warn!("Failed to attach track to {:?}: {}", peer, e),
            }
        }

        senders
    }

    async fn detach_senders(&self, senders: HashMap<ParticipantId, Arc<RTCRtpSender>>) {
        for (peer, sender) in senders {
            let Some(link) = self.links.get(&peer) else {
                continue;
            };
            if let Err(e) = link.remove_sender(&sender).await {
                debug!("Failed to detach track from {:?}: {}", peer, e);
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("Closing {} peer links", self.links.len());

        let peers: Vec<ParticipantId> = self.links.keys().cloned().collect();
        for peer in peers {
            self.remove_link(&peer, true).await;
        }
        self.media.clear();
    }
}
