mod config;
mod error;
mod events;
mod link;
mod manager;
mod media;
mod mux;
mod session;
mod signaling;

pub use config::SessionConfig;
pub use error::SessionError;
pub use events::{EventKind, SessionEvent, SubscriptionId};
pub use session::Session;
