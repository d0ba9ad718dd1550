use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{EventBus, EventKind, SessionEvent, SubscriptionId};
use crate::manager::{PeerCommand, PeerManager, SignalSink};
use crate::mux::ChannelMux;
use crate::signaling::SignalingTransport;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::info;
use trellis_core::{AppMessage, ParticipantId, ScreenShareData};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// One participant's handle on a mesh session.
///
/// [`Session::open`] spawns the signaling transport and the peer manager;
/// every method afterwards is a thin message to one of them, so the handle
/// can be shared and called from any task.
pub struct Session {
    local_id: ParticipantId,
    bus: Arc<EventBus>,
    mux: Arc<ChannelMux>,
    commands: mpsc::Sender<PeerCommand>,
    transport: Arc<SignalingTransport>,
}

impl Session {
    pub fn open(config: SessionConfig) -> Self {
        info!(
            "Opening session as {:?} against {}",
            config.local_id, config.relay_url
        );

        let bus = Arc::new(EventBus::new());
        let mux = Arc::new(ChannelMux::new(bus.clone()));
        let (commands, command_rx) = mpsc::channel(256);

        let transport = Arc::new(SignalingTransport::open(&config, commands.clone()));
        let sink: Arc<dyn SignalSink> = transport.clone();

        let manager = PeerManager::new(&config, sink, mux.clone(), bus.clone(), command_rx);
        tokio::spawn(manager.run());

        Self {
            local_id: config.local_id,
            bus,
            mux,
            commands,
            transport,
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.local_id
    }

    /// Starts dialing `remote`. Progress arrives as events; a connect that
    /// cannot proceed (to self, or over a live link) is logged and absorbed.
    pub async fn connect(&self, remote: impl Into<ParticipantId>) -> Result<(), SessionError> {
        self.command(PeerCommand::Connect {
            remote: remote.into(),
        })
        .await
    }

    pub async fn disconnect(&self, remote: impl Into<ParticipantId>) -> Result<(), SessionError> {
        self.command(PeerCommand::Disconnect {
            remote: remote.into(),
        })
        .await
    }

    /// Fans a message out to every peer with an open data channel.
    pub async fn send(&self, message: &AppMessage) {
        self.mux.broadcast(message).await;
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) {
        self.bus.unsubscribe(kind, id);
    }

    /// Creates the local audio track and attaches it to every live link.
    /// The caller feeds samples into the returned track.
    pub async fn start_local_audio(&self) -> Result<Arc<TrackLocalStaticSample>, SessionError> {
        self.media_request(|reply| PeerCommand::StartAudio { reply })
            .await
    }

    pub async fn stop_local_audio(&self) -> Result<(), SessionError> {
        self.media_request(|reply| PeerCommand::StopAudio { reply })
            .await
    }

    /// Starts the screen track and announces it to the mesh, both over the
    /// data channels and locally on the event bus.
    pub async fn start_screen_share(&self) -> Result<Arc<TrackLocalStaticSample>, SessionError> {
        let track = self
            .media_request(|reply| PeerCommand::StartScreen { reply })
            .await?;
        self.announce_screen_share(true).await;
        Ok(track)
    }

    pub async fn stop_screen_share(&self) -> Result<(), SessionError> {
        self.media_request(|reply| PeerCommand::StopScreen { reply })
            .await?;
        self.announce_screen_share(false).await;
        Ok(())
    }

    /// Tears the session down in order: peer links, local media, then the
    /// signaling connection.
    pub async fn close(&self) {
        let (reply, done) = oneshot::channel();
        if self
            .commands
            .send(PeerCommand::Shutdown { reply })
            .await
            .is_ok()
        {
            let _ = done.await;
        }

        self.transport.close().await;
        info!("Session {:?} closed", self.local_id);
    }

    async fn announce_screen_share(&self, active: bool) {
        let message = AppMessage::ScreenShare(ScreenShareData { active });
        self.mux.broadcast(&message).await;
        self.bus.emit(&SessionEvent::ScreenShare {
            from: self.local_id.clone(),
            active,
        });
    }

    async fn command(&self, command: PeerCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::ShuttingDown)
    }

    async fn media_request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, SessionError>>) -> PeerCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.command(make(reply)).await?;
        response.await.map_err(|_| SessionError::ShuttingDown)?
    }
}
