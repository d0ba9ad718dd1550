use crate::registry::{ConnId, PeerHandle, RegistryCommand};
use axum::Router;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use trellis_core::{RegisterPayload, SignalEnvelope, SignalKind, SignalTarget};

/// Shared handler state: the way into the registry loop.
#[derive(Clone)]
pub struct RelayState {
    pub registry_tx: mpsc::Sender<RegistryCommand>,
}

/// Builds the relay router. The binary and in-process test relays share it.
pub fn router(state: RelayState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: RelayState) {
    let conn = ConnId::new();
    info!("New control connection: {:?}", conn);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => {
                        let Some(cmd) = command_for_frame(text, conn, &tx) else {
                            continue;
                        };
                        if state.registry_tx.send(cmd).await.is_err() {
                            warn!("Registry loop gone, closing connection {:?}", conn);
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    let _ = state.registry_tx.send(RegistryCommand::Closed { conn }).await;
    info!("Control connection closed: {:?}", conn);
}

/// Classifies one inbound frame. Malformed or misaddressed frames yield no
/// command; the connection stays up either way.
fn command_for_frame(
    text: Utf8Bytes,
    conn: ConnId,
    tx: &mpsc::UnboundedSender<Message>,
) -> Option<RegistryCommand> {
    let envelope = match serde_json::from_str::<SignalEnvelope>(&text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Dropping malformed envelope from {:?}: {}", conn, e);
            return None;
        }
    };

    match envelope.kind {
        SignalKind::Register => {
            match serde_json::from_value::<RegisterPayload>(envelope.payload) {
                Ok(register) => Some(RegistryCommand::Register {
                    id: register.participant_id,
                    conn,
                    handle: PeerHandle::new(tx.clone()),
                }),
                Err(e) => {
                    warn!("Dropping register with bad payload from {:?}: {}", conn, e);
                    None
                }
            }
        }
        kind if kind.is_routed() => match envelope.to {
            SignalTarget::Participant(to) => Some(RegistryCommand::Route { to, frame: text }),
            other => {
                debug!("Routed {:?} without a participant target ({:?}), dropped", kind, other);
                None
            }
        },
        other => {
            debug!("Client-sent {:?} dropped", other);
            None
        }
    }
}
