#![deny(unsafe_code)]

pub mod error;
pub mod ids;
/// Wire events exchanged with the chat server.
pub mod protocol;
/// Session lifecycle state machine.
pub mod session;
pub mod typing;

pub use error::{ActionError, ActionResult, CoreError, CoreResult};
pub use ids::{MessageId, SessionId, VisitorId};
pub use protocol::{
    ChatMessage, InboundEvent, MessagePayload, MessageSendPayload, NoticePayload, OutboundEvent,
    ReconnectPayload, RemoteTypingPayload, SenderType, ServerErrorPayload, SessionReconnectedPayload,
    SessionStartPayload, SessionStartedPayload, TypingPayload, decode_frame, encode_frame,
};
pub use session::{
    ChatState, PersistedSession, SessionEffect, SessionStatus, SessionTransitionRejection,
    SessionTransitionResult, VisitorInfo,
};
pub use typing::{DEFAULT_TYPING_QUIET_INTERVAL, TypingDebounce};
