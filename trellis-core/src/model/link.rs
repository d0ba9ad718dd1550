use serde::{Deserialize, Serialize};
use std::fmt;

/// Negotiation state of one peer link.
///
/// Mutated only by the peer manager; everyone else observes it through
/// connection-state-change events. `Closed` is terminal and reached only by
/// explicit disconnect or teardown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl LinkState {
    /// States in which the link participates in the mesh: it accepts media
    /// tracks and may be carrying a data channel.
    pub fn is_live(self) -> bool {
        matches!(self, Self::New | Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
