use crate::model::participant::ParticipantId;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Application message multiplexed over a peer link's data channel.
///
/// `type` is the discriminator on the wire. Kinds this crate does not know
/// deserialize as [`AppMessage::Other`], so collaborators keep raw access to
/// everything a peer sends.
#[derive(Debug, Clone, PartialEq)]
pub enum AppMessage {
    Drawing(DrawingData),
    Cursor(CursorData),
    Sync(SyncData),
    Chat(ChatData),
    MeetingLog(LogEntry),
    ScreenShare(ScreenShareData),
    AiSuggestion(Suggestion),
    Other(Value),
}

impl AppMessage {
    /// The wire discriminator, or `"unknown"` for untagged raw values.
    pub fn kind(&self) -> &str {
        match self {
            Self::Drawing(_) => "drawing",
            Self::Cursor(_) => "cursor",
            Self::Sync(_) => "sync",
            Self::Chat(_) => "chat",
            Self::MeetingLog(_) => "meetingLog",
            Self::ScreenShare(_) => "screenShare",
            Self::AiSuggestion(_) => "ai-suggestion",
            Self::Other(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }

    pub fn chat(text: impl Into<String>) -> Self {
        Self::Chat(ChatData { text: text.into() })
    }
}

/// Known kinds mirror [`AppMessage`] so the tagged representation can be
/// derived; [`AppMessage::Other`] bypasses it with the raw value.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Known {
    Drawing(DrawingData),
    Cursor(CursorData),
    Sync(SyncData),
    Chat(ChatData),
    MeetingLog(LogEntry),
    ScreenShare(ScreenShareData),
    #[serde(rename = "ai-suggestion")]
    AiSuggestion(Suggestion),
}

impl From<Known> for AppMessage {
    fn from(known: Known) -> Self {
        match known {
            Known::Drawing(d) => Self::Drawing(d),
            Known::Cursor(c) => Self::Cursor(c),
            Known::Sync(s) => Self::Sync(s),
            Known::Chat(c) => Self::Chat(c),
            Known::MeetingLog(e) => Self::MeetingLog(e),
            Known::ScreenShare(s) => Self::ScreenShare(s),
            Known::AiSuggestion(s) => Self::AiSuggestion(s),
        }
    }
}

impl Serialize for AppMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Drawing(d) => Known::Drawing(d.clone()).serialize(serializer),
            Self::Cursor(c) => Known::Cursor(c.clone()).serialize(serializer),
            Self::Sync(s) => Known::Sync(s.clone()).serialize(serializer),
            Self::Chat(c) => Known::Chat(c.clone()).serialize(serializer),
            Self::MeetingLog(e) => Known::MeetingLog(e.clone()).serialize(serializer),
            Self::ScreenShare(s) => Known::ScreenShare(s.clone()).serialize(serializer),
            Self::AiSuggestion(s) => Known::AiSuggestion(s.clone()).serialize(serializer),
            Self::Other(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AppMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match Known::deserialize(&value) {
            Ok(known) => Ok(known.into()),
            Err(_) => Ok(Self::Other(value)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawingData {
    pub points: Vec<Point>,
    pub color: String,
    pub width: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CursorData {
    #[serde(rename = "userId")]
    pub user_id: ParticipantId,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncData {
    pub version: u64,
    pub data: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatData {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenShareData {
    pub active: bool,
}

/// One entry in the shared meeting log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: u64,
    pub kind: LogKind,
    pub user: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Join,
    Leave,
    Share,
    Message,
    Decision,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub id: String,
    pub content: String,
    pub timestamp: u64,
}
