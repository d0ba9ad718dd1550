use crate::config::SessionConfig;
use crate::manager::{PeerCommand, SignalSink};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use trellis_core::{ParticipantId, SignalEnvelope, SignalPayload};

type WriterSlot = Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>;

/// Client side of the relay connection.
///
/// A single background task owns the socket for its whole life: it connects,
/// registers, pumps frames both ways, and on any loss waits the configured
/// delay and starts over. Reconnection never gives up and the delay never
/// grows.
///
/// Outbound sends are best effort. While the relay is unreachable the writer
/// slot is empty and envelopes are dropped, not queued; stale SDP is worse
/// than no SDP after a re-registration.
pub struct SignalingTransport {
    writer: WriterSlot,
    task: JoinHandle<()>,
}

impl SignalingTransport {
    /// Spawns the connection task. Events surface as [`PeerCommand`]s on
    /// `commands`: `SignalingOpen` after each successful registration,
    /// `SignalingClosed` after each loss.
    pub fn open(config: &SessionConfig, commands: mpsc::Sender<PeerCommand>) -> Self {
        let writer: WriterSlot = Arc::new(Mutex::new(None));

        let task = tokio::spawn(run_loop(
            config.relay_url.clone(),
            config.local_id.clone(),
            config.reconnect_delay,
            Arc::clone(&writer),
            commands,
        ));

        Self { writer, task }
    }

    pub async fn close(&self) {
        self.task.abort();
        self.writer.lock().await.take();
        info!("Signaling transport closed");
    }
}

impl Drop for SignalingTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl SignalSink for SignalingTransport {
    async fn send(&self, envelope: SignalEnvelope) {
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {:?} envelope: {}", envelope.kind, e);
                return;
            }
        };

        let guard = self.writer.lock().await;
        let Some(tx) = guard.as_ref() else {
            debug!("Relay unreachable, {:?} envelope dropped", envelope.kind);
            return;
        };

        if tx.send(Message::text(json)).is_err() {
            debug!("Relay writer gone, {:?} envelope dropped", envelope.kind);
        }
    }
}

async fn run_loop(
    url: String,
    local_id: ParticipantId,
    delay: Duration,
    writer: WriterSlot,
    commands: mpsc::Sender<PeerCommand>,
) {
    let register = match serde_json::to_string(&SignalEnvelope::register(local_id)) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize register envelope: {}", e);
            return;
        }
    };

    loop {
        let stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("Relay at {} unreachable: {}, retrying in {:?}", url, e, delay);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        let (mut sink, mut source) = stream.split();

        // The writer slot stays empty until registration is on the wire, so
        // no envelope can ever precede it.
        if let Err(e) = sink.send(Message::text(register.clone())).await {
            warn!("Failed to register with relay: {}", e);
            tokio::time::sleep(delay).await;
            continue;
        }

        info!("Registered with relay at {}", url);

        let (tx, mut rx) = mpsc::unbounded_channel();
        *writer.lock().await = Some(tx);
        let _ = commands.send(PeerCommand::SignalingOpen).await;

        loop {
            tokio::select! {
                out = rx.recv() => {
                    match out {
                        Some(frame) => {
                            if let Err(e) = sink.send(frame).await {
                                warn!("Relay write failed: {}", e);
                                break;
                            }
                        }
                        // Only close() empties the slot without replacing it.
                        None => return,
                    }
                }

                inbound = source.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => dispatch_frame(&text, &commands).await,
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Relay closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Relay read error: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        writer.lock().await.take();
        let _ = commands.send(PeerCommand::SignalingClosed).await;
        warn!("Signaling connection lost, reconnecting in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}

/// Turns one inbound relay frame into a peer command. Frames that do not
/// parse are logged and dropped; the connection stays up.
async fn dispatch_frame(text: &str, commands: &mpsc::Sender<PeerCommand>) {
    let envelope: SignalEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Malformed relay frame dropped: {}", e);
            return;
        }
    };

    let payload = match envelope.decode_payload() {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Relay frame dropped: {}", e);
            return;
        }
    };

    let command = match payload {
        SignalPayload::Offer(p) => PeerCommand::RemoteOffer {
            from: envelope.from,
            sdp: p.sdp,
        },
        SignalPayload::Answer(p) => PeerCommand::RemoteAnswer {
            from: envelope.from,
            sdp: p.sdp,
        },
        SignalPayload::IceCandidate(candidate) => PeerCommand::RemoteCandidate {
            from: envelope.from,
            candidate,
        },
        SignalPayload::ParticipantList(participants) => PeerCommand::Roster { participants },
        SignalPayload::Register(_) => {
            debug!("Register frame from {:?} ignored", envelope.from);
            return;
        }
    };

    let _ = commands.send(command).await;
}
