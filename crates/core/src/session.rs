use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::error::{
    ActionResult, BlankMessageSnafu, EmptyVisitorNameSnafu, NoSessionSnafu, NotConnectedSnafu,
    StartPendingSnafu,
};
use super::ids::{MessageId, SessionId, VisitorId};
use super::protocol::{
    ChatMessage, InboundEvent, MessageSendPayload, NoticePayload, OutboundEvent,
    ReconnectPayload, RemoteTypingPayload, SenderType, SessionReconnectedPayload,
    SessionStartPayload, SessionStartedPayload, TypingPayload,
};

/// Lifecycle of one chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Waiting,
    Active,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

/// Intake data captured once when the visitor starts a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorInfo {
    pub name: String,
    pub email: Option<String>,
}

impl VisitorInfo {
    pub fn new(name: impl Into<String>, email: Option<String>) -> Self {
        Self {
            name: name.into(),
            email,
        }
    }

    fn normalized(self) -> Self {
        let email = self
            .email
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty());
        Self {
            name: self.name.trim().to_string(),
            email,
        }
    }
}

/// Record kept outside process memory so a session survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub session_id: SessionId,
    pub visitor_id: VisitorId,
}

/// Side effects the owner of a [`ChatState`] must carry out after an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    Persist(PersistedSession),
    ClearPersisted,
    ServerError(String),
}

/// Rejection reason for inbound events that do not fit the current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransitionRejection {
    UnexpectedEvent {
        status: SessionStatus,
        event: &'static str,
    },
}

pub type SessionTransitionResult = Result<Vec<SessionEffect>, SessionTransitionRejection>;

/// Everything the presentation surface needs to render one chat.
///
/// Inbound events and [`ChatState::reset`] are the only things that mutate the
/// message list or the status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatState {
    connected: bool,
    session_id: Option<SessionId>,
    visitor_id: Option<VisitorId>,
    visitor: Option<VisitorInfo>,
    start_pending: bool,
    status: SessionStatus,
    messages: Vec<ChatMessage>,
    remote_typing: bool,
    last_error: Option<String>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn visitor_id(&self) -> Option<&VisitorId> {
        self.visitor_id.as_ref()
    }

    pub fn visitor(&self) -> Option<&VisitorInfo> {
        self.visitor.as_ref()
    }

    /// True between a sent `session-start` and the server's answer.
    pub fn is_start_pending(&self) -> bool {
        self.start_pending
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// True while the remote party is composing a message.
    pub fn is_remote_typing(&self) -> bool {
        self.remote_typing
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if !connected {
            // The server never answers a start sent over a dead connection.
            self.start_pending = false;
        }
    }

    /// Validates intake data and builds the `session-start` event.
    ///
    /// `persisted_visitor` wins over the visitor id remembered from an earlier
    /// session in this process.
    pub fn begin_session(
        &mut self,
        visitor: VisitorInfo,
        persisted_visitor: Option<VisitorId>,
    ) -> ActionResult<OutboundEvent> {
        let visitor = visitor.normalized();
        ensure!(
            !visitor.name.is_empty(),
            EmptyVisitorNameSnafu {
                stage: "begin-session-validate-name",
            }
        );
        ensure!(
            self.connected,
            NotConnectedSnafu {
                stage: "begin-session-connection",
            }
        );
        ensure!(
            !self.start_pending,
            StartPendingSnafu {
                stage: "begin-session-pending",
            }
        );

        let event = OutboundEvent::SessionStart(SessionStartPayload {
            name: visitor.name.clone(),
            email: visitor.email.clone(),
            visitor_id: persisted_visitor.or_else(|| self.visitor_id.clone()),
        });
        self.visitor = Some(visitor);
        self.start_pending = true;
        Ok(event)
    }

    pub fn compose_message(&self, text: &str) -> ActionResult<OutboundEvent> {
        let text = text.trim();
        ensure!(
            !text.is_empty(),
            BlankMessageSnafu {
                stage: "compose-message-validate-text",
            }
        );
        let session_id = self.require_session("compose-message-session")?;
        ensure!(
            self.connected,
            NotConnectedSnafu {
                stage: "compose-message-connection",
            }
        );

        Ok(OutboundEvent::MessageSend(MessageSendPayload {
            session_id,
            text: text.to_string(),
        }))
    }

    pub fn typing_event(&self, is_typing: bool) -> ActionResult<OutboundEvent> {
        let session_id = self.require_session("typing-event-session")?;
        ensure!(
            self.connected,
            NotConnectedSnafu {
                stage: "typing-event-connection",
            }
        );

        Ok(OutboundEvent::Typing(TypingPayload {
            session_id,
            is_typing,
            sender_type: SenderType::Visitor,
        }))
    }

    pub fn reconnect_event(&self, persisted: &PersistedSession) -> ActionResult<OutboundEvent> {
        ensure!(
            self.connected,
            NotConnectedSnafu {
                stage: "reconnect-event-connection",
            }
        );

        Ok(OutboundEvent::Reconnect(ReconnectPayload {
            session_id: persisted.session_id.clone(),
        }))
    }

    /// Returns to `idle` from any status. The remembered visitor id survives.
    pub fn reset(&mut self) -> SessionEffect {
        self.session_id = None;
        self.visitor = None;
        self.start_pending = false;
        self.status = SessionStatus::Idle;
        self.messages.clear();
        self.remote_typing = false;
        self.last_error = None;
        SessionEffect::ClearPersisted
    }

    pub fn apply(&mut self, event: InboundEvent) -> SessionTransitionResult {
        match event {
            InboundEvent::SessionStarted(payload) => self.apply_started(payload),
            InboundEvent::SessionReconnected(payload) => self.apply_reconnected(payload),
            InboundEvent::Message(payload) => {
                self.messages.push(payload.message);
                self.remote_typing = false;
                Ok(Vec::new())
            }
            InboundEvent::AgentJoined(payload) => self.apply_agent_joined(payload),
            InboundEvent::SessionClosed(payload) => Ok(self.apply_closed(payload)),
            InboundEvent::Typing(payload) => {
                self.apply_remote_typing(payload);
                Ok(Vec::new())
            }
            InboundEvent::Error(payload) => {
                // A refused start arrives as an error; let the visitor retry.
                self.start_pending = false;
                self.last_error = Some(payload.message.clone());
                Ok(vec![SessionEffect::ServerError(payload.message)])
            }
        }
    }

    fn apply_started(&mut self, payload: SessionStartedPayload) -> SessionTransitionResult {
        if self.status != SessionStatus::Idle {
            return Err(SessionTransitionRejection::UnexpectedEvent {
                status: self.status,
                event: "session-started",
            });
        }

        self.start_pending = false;
        self.session_id = Some(payload.session_id.clone());
        self.visitor_id = Some(payload.visitor_id.clone());
        self.status = SessionStatus::Waiting;
        self.merge_history(payload.messages);

        Ok(vec![SessionEffect::Persist(PersistedSession {
            session_id: payload.session_id,
            visitor_id: payload.visitor_id,
        })])
    }

    fn apply_reconnected(&mut self, payload: SessionReconnectedPayload) -> SessionTransitionResult {
        if !matches!(self.status, SessionStatus::Idle | SessionStatus::Waiting) {
            return Err(SessionTransitionRejection::UnexpectedEvent {
                status: self.status,
                event: "session-reconnected",
            });
        }

        self.start_pending = false;
        self.session_id = Some(payload.session_id);
        self.status = payload.status;
        self.merge_history(payload.messages);

        if self.status == SessionStatus::Closed {
            return Ok(vec![SessionEffect::ClearPersisted]);
        }
        Ok(Vec::new())
    }

    fn apply_agent_joined(&mut self, payload: NoticePayload) -> SessionTransitionResult {
        match self.status {
            SessionStatus::Waiting | SessionStatus::Active => {
                self.status = SessionStatus::Active;
                self.messages.extend(payload.message);
                Ok(Vec::new())
            }
            SessionStatus::Idle | SessionStatus::Closed => {
                Err(SessionTransitionRejection::UnexpectedEvent {
                    status: self.status,
                    event: "agent-joined",
                })
            }
        }
    }

    fn apply_closed(&mut self, payload: NoticePayload) -> Vec<SessionEffect> {
        self.status = SessionStatus::Closed;
        self.remote_typing = false;
        self.messages.extend(payload.message);
        vec![SessionEffect::ClearPersisted]
    }

    fn apply_remote_typing(&mut self, payload: RemoteTypingPayload) {
        // Our own indicator may be echoed back by the server.
        if payload.sender_type != SenderType::Visitor {
            self.remote_typing = payload.is_typing;
        }
    }

    /// Appends server history without dropping or duplicating held messages.
    fn merge_history(&mut self, history: Vec<ChatMessage>) {
        let mut known = self
            .messages
            .iter()
            .map(|message| message.id.clone())
            .collect::<HashSet<MessageId>>();
        for message in history {
            if known.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
    }

    fn require_session(&self, stage: &'static str) -> ActionResult<SessionId> {
        match &self.session_id {
            Some(session_id) => Ok(session_id.clone()),
            None => NoSessionSnafu { stage }.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;
    use crate::protocol::{MessagePayload, ServerErrorPayload};

    fn session_id(raw: &str) -> SessionId {
        SessionId::parse(raw).expect("valid session id")
    }

    fn visitor_id(raw: &str) -> VisitorId {
        VisitorId::parse(raw).expect("valid visitor id")
    }

    fn message(id: &str, sender_type: SenderType, content: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::parse(id).expect("valid message id"),
            sender_type,
            content: content.to_string(),
            timestamp: "2024-05-01T10:00:00Z".to_string(),
        }
    }

    fn started(session: &str, history: Vec<ChatMessage>) -> InboundEvent {
        InboundEvent::SessionStarted(SessionStartedPayload {
            session_id: session_id(session),
            visitor_id: visitor_id("v1"),
            messages: history,
        })
    }

    fn connected_state() -> ChatState {
        let mut state = ChatState::new();
        state.set_connected(true);
        state
    }

    fn waiting_state() -> ChatState {
        let mut state = connected_state();
        state
            .begin_session(VisitorInfo::new("Ana", None), None)
            .expect("start accepted");
        state.apply(started("s1", Vec::new())).expect("started applies");
        state
    }

    #[test]
    fn empty_name_never_builds_a_start_event() {
        let mut state = connected_state();
        for name in ["", "   ", "\t\n"] {
            let result = state.begin_session(VisitorInfo::new(name, None), None);
            assert!(matches!(result, Err(ActionError::EmptyVisitorName { .. })));
        }
        assert!(state.visitor().is_none());
    }

    #[test]
    fn start_requires_connection() {
        let mut state = ChatState::new();
        let result = state.begin_session(VisitorInfo::new("Ana", None), None);
        assert!(matches!(result, Err(ActionError::NotConnected { .. })));
    }

    #[test]
    fn start_prefers_persisted_visitor_then_remembered_one() {
        let mut state = waiting_state();
        state.reset();

        let event = state
            .begin_session(VisitorInfo::new(" Ana ", Some("  ".to_string())), None)
            .expect("start accepted");
        assert_eq!(
            event,
            OutboundEvent::SessionStart(SessionStartPayload {
                name: "Ana".to_string(),
                email: None,
                visitor_id: Some(visitor_id("v1")),
            })
        );

        state.reset();
        let event = state
            .begin_session(VisitorInfo::new("Ana", None), Some(visitor_id("v9")))
            .expect("start accepted");
        let OutboundEvent::SessionStart(payload) = event else {
            panic!("expected session-start");
        };
        assert_eq!(payload.visitor_id, Some(visitor_id("v9")));
    }

    #[test]
    fn second_start_is_refused_until_the_server_answers() {
        let mut state = connected_state();
        state
            .begin_session(VisitorInfo::new("Ana", None), None)
            .expect("start accepted");
        assert!(state.is_start_pending());

        let result = state.begin_session(VisitorInfo::new("hello?", None), None);
        assert!(matches!(result, Err(ActionError::StartPending { .. })));
        assert_eq!(state.visitor().map(|visitor| visitor.name.as_str()), Some("Ana"));

        state.apply(started("s1", Vec::new())).expect("started applies");
        assert!(!state.is_start_pending());
    }

    #[test]
    fn pending_start_is_dropped_by_disconnect_error_and_reset() {
        let mut state = connected_state();
        state
            .begin_session(VisitorInfo::new("Ana", None), None)
            .expect("start accepted");
        state.set_connected(false);
        assert!(!state.is_start_pending());

        state.set_connected(true);
        state
            .begin_session(VisitorInfo::new("Ana", None), None)
            .expect("start accepted after reconnect");
        state
            .apply(InboundEvent::Error(ServerErrorPayload {
                message: "intake closed".to_string(),
            }))
            .expect("error applies");
        assert!(!state.is_start_pending());

        state
            .begin_session(VisitorInfo::new("Ana", None), None)
            .expect("start accepted after error");
        state.reset();
        assert!(!state.is_start_pending());
        assert!(
            state
                .begin_session(VisitorInfo::new("Ana", None), None)
                .is_ok()
        );
    }

    #[test]
    fn blank_text_is_rejected_in_every_status() {
        let mut states = vec![ChatState::new(), connected_state(), waiting_state()];
        let mut active = waiting_state();
        active
            .apply(InboundEvent::AgentJoined(NoticePayload::default()))
            .expect("agent joins");
        states.push(active.clone());
        active
            .apply(InboundEvent::SessionClosed(NoticePayload::default()))
            .expect("session closes");
        states.push(active);

        for state in &states {
            for text in ["", " ", "\n\t "] {
                assert!(matches!(
                    state.compose_message(text),
                    Err(ActionError::BlankMessage { .. })
                ));
            }
        }
    }

    #[test]
    fn message_send_trims_text_and_needs_a_session() {
        assert!(matches!(
            connected_state().compose_message("Hola"),
            Err(ActionError::NoSession { .. })
        ));

        let event = waiting_state()
            .compose_message("  Hola \n")
            .expect("message accepted");
        assert_eq!(
            event,
            OutboundEvent::MessageSend(MessageSendPayload {
                session_id: session_id("s1"),
                text: "Hola".to_string(),
            })
        );
    }

    #[test]
    fn session_started_moves_to_waiting_and_persists() {
        let mut state = connected_state();
        let effects = state
            .apply(started("s1", vec![message("m1", SenderType::System, "Welcome")]))
            .expect("started applies");

        assert_eq!(state.status(), SessionStatus::Waiting);
        assert_eq!(state.session_id(), Some(&session_id("s1")));
        assert_eq!(state.messages().len(), 1);
        assert_eq!(
            effects,
            vec![SessionEffect::Persist(PersistedSession {
                session_id: session_id("s1"),
                visitor_id: visitor_id("v1"),
            })]
        );
    }

    #[test]
    fn session_started_is_rejected_once_active() {
        let mut state = waiting_state();
        state
            .apply(InboundEvent::AgentJoined(NoticePayload::default()))
            .expect("agent joins");

        let result = state.apply(started("s2", Vec::new()));
        assert_eq!(
            result,
            Err(SessionTransitionRejection::UnexpectedEvent {
                status: SessionStatus::Active,
                event: "session-started",
            })
        );
        assert_eq!(state.session_id(), Some(&session_id("s1")));
    }

    #[test]
    fn reconnect_restores_server_status_and_merges_history() {
        let mut state = connected_state();
        state
            .apply(InboundEvent::Message(MessagePayload {
                message: message("m1", SenderType::Agent, "Hi"),
            }))
            .expect("message applies");

        state
            .apply(InboundEvent::SessionReconnected(SessionReconnectedPayload {
                session_id: session_id("s1"),
                status: SessionStatus::Active,
                messages: vec![
                    message("m1", SenderType::Agent, "Hi"),
                    message("m2", SenderType::Visitor, "Hello"),
                ],
            }))
            .expect("reconnect applies");

        assert_eq!(state.status(), SessionStatus::Active);
        let ids = state
            .messages()
            .iter()
            .map(|message| message.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn reconnect_to_a_closed_session_clears_persisted_record() {
        let mut state = connected_state();
        let effects = state
            .apply(InboundEvent::SessionReconnected(SessionReconnectedPayload {
                session_id: session_id("s1"),
                status: SessionStatus::Closed,
                messages: vec![message("m1", SenderType::System, "Chat ended")],
            }))
            .expect("reconnect applies");

        assert_eq!(state.status(), SessionStatus::Closed);
        assert_eq!(effects, vec![SessionEffect::ClearPersisted]);

        let mut live = connected_state();
        let effects = live
            .apply(InboundEvent::SessionReconnected(SessionReconnectedPayload {
                session_id: session_id("s2"),
                status: SessionStatus::Waiting,
                messages: Vec::new(),
            }))
            .expect("reconnect applies");
        assert!(effects.is_empty());
    }

    #[test]
    fn message_event_appends_once_and_clears_typing() {
        let mut state = waiting_state();
        state
            .apply(InboundEvent::Typing(RemoteTypingPayload {
                sender_type: SenderType::Agent,
                is_typing: true,
            }))
            .expect("typing applies");
        assert!(state.is_remote_typing());

        let before = state.messages().len();
        state
            .apply(InboundEvent::Message(MessagePayload {
                message: message("m5", SenderType::Agent, "How can I help?"),
            }))
            .expect("message applies");

        assert_eq!(state.messages().len(), before + 1);
        assert!(!state.is_remote_typing());
    }

    #[test]
    fn visitor_typing_echo_is_ignored() {
        let mut state = waiting_state();
        state
            .apply(InboundEvent::Typing(RemoteTypingPayload {
                sender_type: SenderType::Visitor,
                is_typing: true,
            }))
            .expect("typing applies");
        assert!(!state.is_remote_typing());
    }

    #[test]
    fn agent_joined_activates_waiting_session() {
        let mut state = waiting_state();
        state
            .apply(InboundEvent::AgentJoined(NoticePayload {
                message: Some(message("m2", SenderType::System, "Sam joined")),
            }))
            .expect("agent joins");

        assert_eq!(state.status(), SessionStatus::Active);
        assert_eq!(state.messages().len(), 1);

        let mut idle = connected_state();
        assert!(
            idle.apply(InboundEvent::AgentJoined(NoticePayload::default()))
                .is_err()
        );
        assert_eq!(idle.status(), SessionStatus::Idle);
    }

    #[test]
    fn close_clears_persisted_record_from_any_status() {
        let mut idle = connected_state();
        let mut waiting = waiting_state();
        let mut closed = waiting_state();
        closed
            .apply(InboundEvent::SessionClosed(NoticePayload::default()))
            .expect("first close");

        for state in [&mut idle, &mut waiting, &mut closed] {
            let effects = state
                .apply(InboundEvent::SessionClosed(NoticePayload::default()))
                .expect("close applies");
            assert_eq!(state.status(), SessionStatus::Closed);
            assert_eq!(effects, vec![SessionEffect::ClearPersisted]);
        }
    }

    #[test]
    fn server_error_is_surfaced_without_status_change() {
        let mut state = waiting_state();
        let effects = state
            .apply(InboundEvent::Error(ServerErrorPayload {
                message: "agent pool exhausted".to_string(),
            }))
            .expect("error applies");

        assert_eq!(state.status(), SessionStatus::Waiting);
        assert_eq!(state.last_error(), Some("agent pool exhausted"));
        assert_eq!(
            effects,
            vec![SessionEffect::ServerError("agent pool exhausted".to_string())]
        );
    }

    #[test]
    fn reset_returns_to_idle_and_keeps_visitor_id() {
        let mut state = waiting_state();
        state
            .apply(InboundEvent::Message(MessagePayload {
                message: message("m1", SenderType::Agent, "Hi"),
            }))
            .expect("message applies");

        assert_eq!(state.reset(), SessionEffect::ClearPersisted);
        assert_eq!(state.session_id(), None);
        assert!(state.messages().is_empty());
        assert_eq!(state.status(), SessionStatus::Idle);
        assert!(state.visitor().is_none());
        assert_eq!(state.visitor_id(), Some(&visitor_id("v1")));
    }
}
