use axum::extract::ws::{Message, Utf8Bytes};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use trellis_core::{ParticipantId, SignalEnvelope};
use uuid::Uuid;

/// Identity of one WebSocket connection, distinct from the participant id
/// announced over it. A close event only evicts the entry created by the
/// same connection, so a stale socket can never evict its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound half of a registered connection.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl PeerHandle {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    fn send_text(&self, frame: Utf8Bytes) -> bool {
        self.tx.send(Message::Text(frame)).is_ok()
    }
}

#[derive(Debug)]
pub enum RegistryCommand {
    Register {
        id: ParticipantId,
        conn: ConnId,
        handle: PeerHandle,
    },
    Route {
        to: ParticipantId,
        frame: Utf8Bytes,
    },
    Closed {
        conn: ConnId,
    },
}

struct Entry {
    conn: ConnId,
    handle: PeerHandle,
}

/// Participant directory. All mutations happen inside [`Registry::run`], one
/// command at a time, so a register and its roster broadcast are atomic with
/// respect to every other connection.
pub struct Registry {
    participants: HashMap<ParticipantId, Entry>,
    command_rx: mpsc::Receiver<RegistryCommand>,
}

impl Registry {
    pub fn new(command_rx: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            participants: HashMap::new(),
            command_rx,
        }
    }

    pub async fn run(mut self) {
        info!("Registry loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                RegistryCommand::Register { id, conn, handle } => self.register(id, conn, handle),
                RegistryCommand::Route { to, frame } => self.route(&to, frame),
                RegistryCommand::Closed { conn } => self.unregister(conn),
            }
        }

        info!("Registry loop finished");
    }

    fn register(&mut self, id: ParticipantId, conn: ConnId, handle: PeerHandle) {
        let previous = self.participants.insert(id.clone(), Entry { conn, handle });

        if previous.is_some() {
            warn!("Participant re-registered, replacing handle: {:?}", id);
        } else {
            info!("Participant registered: {:?}", id);
        }

        self.broadcast_roster();
    }

    /// Forwards the frame verbatim if the target is registered; otherwise the
    /// frame is dropped and the sender is not told.
    fn route(&self, to: &ParticipantId, frame: Utf8Bytes) {
        let Some(entry) = self.participants.get(to) else {
            debug!("No such participant, frame dropped: {:?}", to);
            return;
        };

        if !entry.handle.send_text(frame) {
            debug!("Target connection already closing, frame dropped: {:?}", to);
        }
    }

    fn unregister(&mut self, conn: ConnId) {
        let before = self.participants.len();
        self.participants.retain(|_, entry| entry.conn != conn);

        if self.participants.len() != before {
            self.broadcast_roster();
        }
    }

    fn roster(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self.participants.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn broadcast_roster(&self) {
        let roster = self.roster();
        let envelope = SignalEnvelope::participant_list(&roster);

        let frame: Utf8Bytes = match serde_json::to_string(&envelope) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize participant list: {}", e);
                return;
            }
        };

        debug!("Broadcasting participant list to {} peers", roster.len());

        for entry in self.participants.values() {
            entry.handle.send_text(frame.clone());
        }
    }
}
