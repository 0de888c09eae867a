//! Named real-time events exchanged with the chat server.
//!
//! Every frame is a JSON text message shaped as `{"event": "<name>", "data": {...}}`.
//! Payload fields use camelCase on the wire.

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::error::{CoreResult, DecodeFrameSnafu, EncodeFrameSnafu};
use super::ids::{MessageId, SessionId, VisitorId};
use super::session::SessionStatus;

/// Who authored a message or a typing signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Visitor,
    Agent,
    System,
}

/// One immutable chat message as delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_type: SenderType,
    pub content: String,
    /// Server-formatted timestamp, kept verbatim.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<VisitorId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendPayload {
    pub session_id: SessionId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub session_id: SessionId,
    pub is_typing: bool,
    pub sender_type: SenderType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPayload {
    pub session_id: SessionId,
}

/// Events the client emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    SessionStart(SessionStartPayload),
    MessageSend(MessageSendPayload),
    Typing(TypingPayload),
    Reconnect(ReconnectPayload),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStart(_) => "session-start",
            Self::MessageSend(_) => "message-send",
            Self::Typing(_) => "typing",
            Self::Reconnect(_) => "reconnect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartedPayload {
    pub session_id: SessionId,
    pub visitor_id: VisitorId,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReconnectedPayload {
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message: ChatMessage,
}

/// Payload for events that may carry an announcement message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoticePayload {
    #[serde(default)]
    pub message: Option<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTypingPayload {
    pub sender_type: SenderType,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorPayload {
    pub message: String,
}

/// Events the server pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum InboundEvent {
    SessionStarted(SessionStartedPayload),
    SessionReconnected(SessionReconnectedPayload),
    Message(MessagePayload),
    AgentJoined(NoticePayload),
    SessionClosed(NoticePayload),
    Typing(RemoteTypingPayload),
    Error(ServerErrorPayload),
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted(_) => "session-started",
            Self::SessionReconnected(_) => "session-reconnected",
            Self::Message(_) => "message",
            Self::AgentJoined(_) => "agent-joined",
            Self::SessionClosed(_) => "session-closed",
            Self::Typing(_) => "typing",
            Self::Error(_) => "error",
        }
    }
}

pub fn encode_frame(event: &OutboundEvent) -> CoreResult<String> {
    serde_json::to_string(event).context(EncodeFrameSnafu {
        stage: "encode-outbound-frame",
    })
}

pub fn decode_frame(raw: &str) -> CoreResult<InboundEvent> {
    serde_json::from_str(raw).context(DecodeFrameSnafu {
        stage: "decode-inbound-frame",
    })
}
