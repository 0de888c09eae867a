//! Line-oriented presentation surface.
//!
//! Renders [`ChatState`] changes as text and turns input lines into client actions.
//! Holds only ephemeral UI state: the intake form step and what was already printed.

use livechat_client::ChatNotice;
use livechat_core::{ChatMessage, ChatState, SenderType, SessionId, SessionStatus, VisitorInfo};

pub const QUIT_COMMAND: &str = "/quit";
pub const NEW_CHAT_COMMAND: &str = "/new";

/// What the surface asks the runtime to do with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceAction {
    Start(VisitorInfo),
    Send(String),
    Reset,
    Quit,
    Say(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum IntakeStep {
    #[default]
    Name,
    Email {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct IntakeForm {
    step: IntakeStep,
}

impl IntakeForm {
    fn prompt(&self) -> &'static str {
        match self.step {
            IntakeStep::Name => "Your name:",
            IntakeStep::Email { .. } => "Email (optional, press enter to skip):",
        }
    }

    fn submit(&mut self, line: &str) -> Option<VisitorInfo> {
        match std::mem::take(&mut self.step) {
            IntakeStep::Name => {
                let name = line.trim();
                if !name.is_empty() {
                    self.step = IntakeStep::Email {
                        name: name.to_string(),
                    };
                }
                None
            }
            IntakeStep::Email { name } => {
                let email = Some(line.trim().to_string()).filter(|email| !email.is_empty());
                Some(VisitorInfo::new(name, email))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Surface {
    form: IntakeForm,
    rendered_messages: usize,
    rendered_session: Option<SessionId>,
    last_status: Option<(bool, SessionStatus)>,
    last_remote_typing: bool,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_line(&mut self, line: &str, state: &ChatState) -> SurfaceAction {
        let trimmed = line.trim();
        if trimmed == QUIT_COMMAND {
            return SurfaceAction::Quit;
        }
        if trimmed == NEW_CHAT_COMMAND {
            return if state.status() == SessionStatus::Closed {
                SurfaceAction::Reset
            } else {
                SurfaceAction::Say("The current chat is still open.".to_string())
            };
        }

        match state.status() {
            SessionStatus::Closed => SurfaceAction::Say(format!(
                "This chat has ended. Type {NEW_CHAT_COMMAND} to start a new one."
            )),
            SessionStatus::Idle if state.session_id().is_none() => {
                if !state.is_connected() {
                    return SurfaceAction::Say("Still connecting, please wait.".to_string());
                }
                if state.is_start_pending() {
                    return SurfaceAction::Say("Starting chat...".to_string());
                }
                match self.form.submit(line) {
                    Some(visitor) => SurfaceAction::Start(visitor),
                    None => SurfaceAction::Say(self.form.prompt().to_string()),
                }
            }
            _ => SurfaceAction::Send(line.to_string()),
        }
    }

    /// Returns the lines describing what changed since the last render.
    pub fn render_changes(&mut self, state: &ChatState) -> Vec<String> {
        let mut lines = Vec::new();

        let status = (state.is_connected(), state.status());
        if self.last_status != Some(status) {
            self.last_status = Some(status);
            lines.push(format!("-- {} --", status_text(state)));
            if state.is_connected() && state.status() == SessionStatus::Idle {
                self.form = IntakeForm::default();
                lines.push(self.form.prompt().to_string());
            }
        }

        // A reset or a different session replaces the history; start counting again.
        let session_replaced = self.rendered_session.is_some()
            && state.session_id() != self.rendered_session.as_ref();
        if session_replaced || state.messages().len() < self.rendered_messages {
            self.rendered_messages = 0;
        }
        self.rendered_session = state.session_id().cloned();
        for message in &state.messages()[self.rendered_messages..] {
            lines.push(render_message(message));
        }
        self.rendered_messages = state.messages().len();

        if state.is_remote_typing() != self.last_remote_typing {
            self.last_remote_typing = state.is_remote_typing();
            if self.last_remote_typing {
                lines.push("Agent is typing...".to_string());
            }
        }

        lines
    }
}

pub fn status_text(state: &ChatState) -> &'static str {
    if !state.is_connected() {
        return "Connecting...";
    }

    match state.status() {
        SessionStatus::Idle => "Connected",
        SessionStatus::Waiting => "Waiting for an agent",
        SessionStatus::Active => "Chatting with an agent",
        SessionStatus::Closed => "Chat closed",
    }
}

pub fn render_message(message: &ChatMessage) -> String {
    match message.sender_type {
        SenderType::Visitor => format!("[{}] You: {}", message.timestamp, message.content),
        SenderType::Agent => format!("[{}] Agent: {}", message.timestamp, message.content),
        SenderType::System => format!("* {} *", message.content),
    }
}

pub fn render_notice(notice: &ChatNotice) -> Option<String> {
    match notice {
        ChatNotice::ServerError { message } => Some(format!("! {message}")),
        ChatNotice::Disconnected { reason: Some(reason) } => {
            Some(format!("! Connection lost: {reason}"))
        }
        ChatNotice::Disconnected { reason: None } => Some("! Connection lost".to_string()),
        ChatNotice::MalformedFrame { .. }
        | ChatNotice::RejectedEvent { .. }
        | ChatNotice::PersistenceFailed { .. } => None,
    }
}
