use crate::model::participant::ParticipantId;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Register,
    Offer,
    Answer,
    IceCandidate,
    ParticipantList,
}

impl SignalKind {
    /// Point-to-point kinds are routed by `to`; the rest are control traffic
    /// between a participant and the relay itself.
    pub fn is_routed(self) -> bool {
        matches!(self, Self::Offer | Self::Answer | Self::IceCandidate)
    }
}

/// Destination of an envelope: a participant id or one of the reserved
/// addressing words. Serialized as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SignalTarget {
    Participant(ParticipantId),
    Server,
    All,
}

impl SignalTarget {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Participant(id) => id.as_str(),
            Self::Server => "server",
            Self::All => "all",
        }
    }
}

impl From<ParticipantId> for SignalTarget {
    fn from(id: ParticipantId) -> Self {
        Self::Participant(id)
    }
}

impl Serialize for SignalTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SignalTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "server" => Self::Server,
            "all" => Self::All,
            _ => Self::Participant(ParticipantId::new(raw)),
        })
    }
}

/// Control-channel envelope: one JSON text frame on the relay connection.
///
/// `payload` stays opaque inside the envelope. The relay forwards it
/// untouched; consumers type it via [`SignalEnvelope::decode_payload`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalEnvelope {
    pub kind: SignalKind,
    pub payload: Value,
    pub from: ParticipantId,
    pub to: SignalTarget,
}

impl SignalEnvelope {
    pub fn register(from: ParticipantId) -> Self {
        Self {
            kind: SignalKind::Register,
            payload: json!({ "participantId": &from }),
            from,
            to: SignalTarget::Server,
        }
    }

    pub fn offer(from: ParticipantId, to: ParticipantId, sdp: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Offer,
            payload: json!({ "sdp": sdp.into() }),
            from,
            to: to.into(),
        }
    }

    pub fn answer(from: ParticipantId, to: ParticipantId, sdp: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Answer,
            payload: json!({ "sdp": sdp.into() }),
            from,
            to: to.into(),
        }
    }

    pub fn ice_candidate(
        from: ParticipantId,
        to: ParticipantId,
        candidate: &CandidatePayload,
    ) -> Self {
        Self {
            kind: SignalKind::IceCandidate,
            payload: json!(candidate),
            from,
            to: to.into(),
        }
    }

    pub fn participant_list(ids: &[ParticipantId]) -> Self {
        Self {
            kind: SignalKind::ParticipantList,
            payload: json!(ids),
            from: ParticipantId::server(),
            to: SignalTarget::All,
        }
    }

    /// Types the opaque payload according to `kind`.
    pub fn decode_payload(&self) -> Result<SignalPayload, EnvelopeError> {
        let typed = match self.kind {
            SignalKind::Register => {
                SignalPayload::Register(self.payload_as::<RegisterPayload>()?)
            }
            SignalKind::Offer => SignalPayload::Offer(self.payload_as::<SdpPayload>()?),
            SignalKind::Answer => SignalPayload::Answer(self.payload_as::<SdpPayload>()?),
            SignalKind::IceCandidate => {
                SignalPayload::IceCandidate(self.payload_as::<CandidatePayload>()?)
            }
            SignalKind::ParticipantList => {
                SignalPayload::ParticipantList(self.payload_as::<Vec<ParticipantId>>()?)
            }
        };
        Ok(typed)
    }

    fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, EnvelopeError> {
        T::deserialize(&self.payload).map_err(|source| EnvelopeError {
            kind: self.kind,
            source,
        })
    }
}

/// Typed view of an envelope payload at the consumer boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalPayload {
    Register(RegisterPayload),
    Offer(SdpPayload),
    Answer(SdpPayload),
    IceCandidate(CandidatePayload),
    ParticipantList(Vec<ParticipantId>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub participant_id: ParticipantId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SdpPayload {
    pub sdp: String,
}

/// Trickle ICE candidate in browser JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

#[derive(Debug, Error)]
#[error("malformed {kind:?} payload: {source}")]
pub struct EnvelopeError {
    pub kind: SignalKind,
    #[source]
    source: serde_json::Error,
}
