use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque participant identity, chosen by the joining participant.
///
/// Uniqueness within a session is the caller's contract; the relay applies
/// last-write-wins when an id is reused. `"server"` and `"all"` are reserved
/// addressing words and never resolve to a participant.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved identity the relay stamps as `from` on control messages.
    pub fn server() -> Self {
        Self("server".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
