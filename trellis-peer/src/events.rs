use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use trellis_core::{AppMessage, LinkState, LogEntry, ParticipantId, Suggestion};
use uuid::Uuid;
use webrtc::track::track_remote::TrackRemote;

/// Event categories a collaborator can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SignalingOpen,
    SignalingClosed,
    ParticipantList,
    ConnectionStateChange,
    PeerConnected,
    PeerDisconnected,
    Data,
    RemoteTrack,
    ScreenShare,
    MeetingLog,
    AiSuggestion,
}

/// Everything the session reports to its collaborators.
#[derive(Clone)]
pub enum SessionEvent {
    SignalingOpen,
    SignalingClosed,
    ParticipantList {
        participants: Vec<ParticipantId>,
    },
    ConnectionStateChange {
        peer: ParticipantId,
        state: LinkState,
    },
    PeerConnected {
        peer: ParticipantId,
    },
    PeerDisconnected {
        peer: ParticipantId,
    },
    Data {
        from: ParticipantId,
        message: AppMessage,
    },
    RemoteTrack {
        peer: ParticipantId,
        track: Arc<TrackRemote>,
    },
    ScreenShare {
        from: ParticipantId,
        active: bool,
    },
    MeetingLog {
        from: ParticipantId,
        entry: LogEntry,
    },
    AiSuggestion {
        from: ParticipantId,
        suggestion: Suggestion,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SignalingOpen => EventKind::SignalingOpen,
            Self::SignalingClosed => EventKind::SignalingClosed,
            Self::ParticipantList { .. } => EventKind::ParticipantList,
            Self::ConnectionStateChange { .. } => EventKind::ConnectionStateChange,
            Self::PeerConnected { .. } => EventKind::PeerConnected,
            Self::PeerDisconnected { .. } => EventKind::PeerDisconnected,
            Self::Data { .. } => EventKind::Data,
            Self::RemoteTrack { .. } => EventKind::RemoteTrack,
            Self::ScreenShare { .. } => EventKind::ScreenShare,
            Self::MeetingLog { .. } => EventKind::MeetingLog,
            Self::AiSuggestion { .. } => EventKind::AiSuggestion,
        }
    }
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignalingOpen => f.write_str("SignalingOpen"),
            Self::SignalingClosed => f.write_str("SignalingClosed"),
            Self::ParticipantList { participants } => f
                .debug_struct("ParticipantList")
                .field("participants", participants)
                .finish(),
            Self::ConnectionStateChange { peer, state } => f
                .debug_struct("ConnectionStateChange")
                .field("peer", peer)
                .field("state", state)
                .finish(),
            Self::PeerConnected { peer } => {
                f.debug_struct("PeerConnected").field("peer", peer).finish()
            }
            Self::PeerDisconnected { peer } => f
                .debug_struct("PeerDisconnected")
                .field("peer", peer)
                .finish(),
            Self::Data { from, message } => f
                .debug_struct("Data")
                .field("from", from)
                .field("message", message)
                .finish(),
            Self::RemoteTrack { peer, .. } => f
                .debug_struct("RemoteTrack")
                .field("peer", peer)
                .finish_non_exhaustive(),
            Self::ScreenShare { from, active } => f
                .debug_struct("ScreenShare")
                .field("from", from)
                .field("active", active)
                .finish(),
            Self::MeetingLog { from, entry } => f
                .debug_struct("MeetingLog")
                .field("from", from)
                .field("entry", entry)
                .finish(),
            Self::AiSuggestion { from, suggestion } => f
                .debug_struct("AiSuggestion")
                .field("from", from)
                .field("suggestion", suggestion)
                .finish(),
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Identity of one attached handler, used to detach it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

struct Subscriber {
    id: SubscriptionId,
    handler: EventHandler,
}

/// Typed publish/subscribe with one subscriber list per [`EventKind`].
#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<EventKind, Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers.entry(kind).or_default().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        id
    }

    /// Detaches one handler. Unknown ids are a no-op.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) {
        if let Some(mut subscribers) = self.subscribers.get_mut(&kind) {
            subscribers.retain(|s| s.id != id);
        }
    }

    /// Invokes every handler attached to the event's kind. The list is
    /// snapshotted before invocation so handlers can subscribe or detach
    /// from inside a callback.
    pub fn emit(&self, event: &SessionEvent) {
        let handlers: Vec<EventHandler> = match self.subscribers.get(&event.kind()) {
            Some(subscribers) => subscribers.iter().map(|s| s.handler.clone()).collect(),
            None => return,
        };

        for handler in handlers {
            handler(event);
        }
    }
}
