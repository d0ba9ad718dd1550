use thiserror::Error;

/// Failures surfaced by the session API. Link-level trouble during
/// negotiation is logged and reflected in link state instead; nothing in
/// here is fatal to the process.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0} capture is already running")]
    MediaAlreadyStarted(&'static str),

    #[error("{0} capture is not running")]
    MediaNotStarted(&'static str),

    #[error("session is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),
}
