mod app;
mod envelope;
mod link;
mod participant;

pub use app::{
    AppMessage, ChatData, CursorData, DrawingData, LogEntry, LogKind, Point, ScreenShareData,
    Suggestion, SyncData,
};
pub use envelope::{
    CandidatePayload, EnvelopeError, RegisterPayload, SdpPayload, SignalEnvelope, SignalKind,
    SignalPayload, SignalTarget,
};
pub use link::LinkState;
pub use participant::ParticipantId;
