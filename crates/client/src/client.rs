use std::sync::Arc;
use std::time::Duration;

use livechat_core::{
    ActionError, ChatState, DEFAULT_TYPING_QUIET_INTERVAL, OutboundEvent, PersistedSession,
    SessionEffect, SessionTransitionRejection, TypingDebounce, VisitorInfo,
};
use livechat_storage::SessionRecordStore;
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{ActorStoppedSnafu, ClientError, ClientResult, RejectedSnafu};
use crate::transport::{ChatTransport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub typing_quiet_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            typing_quiet_interval: DEFAULT_TYPING_QUIET_INTERVAL,
        }
    }
}

/// Things the presentation surface should tell the visitor about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatNotice {
    ServerError {
        message: String,
    },
    MalformedFrame {
        details: String,
    },
    Disconnected {
        reason: Option<String>,
    },
    RejectedEvent {
        event: &'static str,
        rejection: SessionTransitionRejection,
    },
    PersistenceFailed {
        details: String,
    },
}

pub struct ChatNotices {
    events: mpsc::UnboundedReceiver<ChatNotice>,
}

impl ChatNotices {
    pub async fn recv(&mut self) -> Option<ChatNotice> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChatNotice> {
        self.events.try_recv().ok()
    }
}

type Reply = oneshot::Sender<ClientResult<()>>;

enum Command {
    StartSession { visitor: VisitorInfo, reply: Reply },
    SendMessage { text: String, reply: Reply },
    SendTyping { is_typing: bool, reply: Reply },
    Reset { reply: Reply },
    Shutdown,
}

/// Handle to the actor that owns the chat connection and session state.
///
/// Dropping the handle stops the actor and closes the connection.
pub struct ChatClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ChatState>,
    actor: Option<JoinHandle<()>>,
    transport_worker: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Opens the transport and spawns the session actor on the current tokio runtime.
    pub fn spawn(
        config: ClientConfig,
        transport: &dyn ChatTransport,
        store: Arc<dyn SessionRecordStore>,
    ) -> ClientResult<(Self, ChatNotices)> {
        let handle = transport.open()?;
        tracing::info!(transport = transport.id(), "opening chat connection");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ChatState::new());

        let actor = SessionActor {
            state: ChatState::new(),
            typing: TypingDebounce::new(config.typing_quiet_interval),
            store,
            outbound: handle.outbound,
            inbound: handle.inbound,
            inbound_open: true,
            disconnect_reported: false,
            commands: command_rx,
            state_tx,
            notices: notice_tx,
        };

        let transport_worker = tokio::spawn(handle.worker);
        let actor = tokio::spawn(actor.run());

        Ok((
            Self {
                commands: command_tx,
                state: state_rx,
                actor: Some(actor),
                transport_worker: Some(transport_worker),
            },
            ChatNotices { events: notice_rx },
        ))
    }

    pub async fn start_session(&self, visitor: VisitorInfo) -> ClientResult<()> {
        self.request(|reply| Command::StartSession { visitor, reply })
            .await
    }

    pub async fn send_message(&self, text: impl Into<String>) -> ClientResult<()> {
        let text = text.into();
        self.request(|reply| Command::SendMessage { text, reply })
            .await
    }

    pub async fn send_typing(&self, is_typing: bool) -> ClientResult<()> {
        self.request(|reply| Command::SendTyping { is_typing, reply })
            .await
    }

    pub async fn reset(&self) -> ClientResult<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.clone()
    }

    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(actor) = self.actor.take() {
            let _ = actor.await;
        }
        // The worker sees the outbound channel close once the actor is gone.
        if let Some(worker) = self.transport_worker.take() {
            let _ = worker.await;
        }
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> ClientResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(command(reply_tx)).is_err() {
            return ActorStoppedSnafu {
                stage: "send-command",
            }
            .fail();
        }

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => ActorStoppedSnafu {
                stage: "await-command-reply",
            }
            .fail(),
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(actor) = self.actor.take() {
            actor.abort();
        }
        if let Some(worker) = self.transport_worker.take() {
            worker.abort();
        }
    }
}

struct SessionActor {
    state: ChatState,
    typing: TypingDebounce,
    store: Arc<dyn SessionRecordStore>,
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    inbound_open: bool,
    disconnect_reported: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ChatState>,
    notices: mpsc::UnboundedSender<ChatNotice>,
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            let typing_deadline = self.typing.deadline();

            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }
                event = self.inbound.recv(), if self.inbound_open => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => {
                            self.inbound_open = false;
                            self.on_disconnected(None);
                        }
                    }
                }
                _ = wait_until(typing_deadline) => self.expire_typing(),
            }
        }

        tracing::debug!("chat session actor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartSession { visitor, reply } => {
                let result = self.start_session(visitor).await;
                let _ = reply.send(result);
            }
            Command::SendMessage { text, reply } => {
                let result = self
                    .state
                    .compose_message(&text)
                    .context(RejectedSnafu {
                        stage: "send-message",
                    })
                    .and_then(|event| self.emit(event));
                let _ = reply.send(result);
            }
            Command::SendTyping { is_typing, reply } => {
                let _ = reply.send(self.send_typing(is_typing));
            }
            Command::Reset { reply } => {
                // The pending clear needs the session id that reset drops.
                if self.typing.update(false, now()).is_some() {
                    match self.state.typing_event(false) {
                        Ok(event) => {
                            if let Err(error) = self.emit(event) {
                                tracing::debug!(error = %error, "typing clear not delivered");
                            }
                        }
                        Err(error) => tracing::debug!(error = %error, "typing clear skipped"),
                    }
                }
                let effect = self.state.reset();
                self.run_effect(effect).await;
                self.publish();
                tracing::info!("chat session reset to idle");
                let _ = reply.send(Ok(()));
            }
            Command::Shutdown => {}
        }
    }

    async fn start_session(&mut self, visitor: VisitorInfo) -> ClientResult<()> {
        let persisted_visitor = self
            .load_persisted()
            .await
            .map(|record| record.visitor_id);
        let event = self
            .state
            .begin_session(visitor, persisted_visitor)
            .context(RejectedSnafu {
                stage: "start-session",
            })?;
        self.publish();
        self.emit(event)
    }

    fn send_typing(&mut self, is_typing: bool) -> ClientResult<()> {
        // Preconditions are checked before the debounce so a refused call leaves it untouched.
        self.state
            .typing_event(is_typing)
            .context(RejectedSnafu {
                stage: "send-typing",
            })?;

        match self.typing.update(is_typing, now()) {
            Some(value) => {
                let event = self.state.typing_event(value).context(RejectedSnafu {
                    stage: "send-typing",
                })?;
                self.emit(event)
            }
            None => Ok(()),
        }
    }

    fn expire_typing(&mut self) {
        let Some(value) = self.typing.expire(now()) else {
            return;
        };

        match self.state.typing_event(value) {
            Ok(event) => {
                if let Err(error) = self.emit(event) {
                    tracing::debug!(error = %error, "typing clear not delivered");
                }
            }
            Err(error) => tracing::debug!(error = %error, "typing clear skipped"),
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                tracing::info!("chat connection established");
                self.disconnect_reported = false;
                self.state.set_connected(true);
                self.publish();

                if let Some(record) = self.load_persisted().await {
                    tracing::info!(session_id = %record.session_id, "resuming persisted chat session");
                    match self.state.reconnect_event(&record) {
                        Ok(event) => {
                            if let Err(error) = self.emit(event) {
                                tracing::warn!(error = %error, "failed to request session reconnect");
                            }
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "failed to request session reconnect")
                        }
                    }
                }
            }
            TransportEvent::Disconnected { reason } => self.on_disconnected(reason),
            TransportEvent::Frame(event) => {
                let name = event.name();
                tracing::debug!(event = name, "received chat frame");
                match self.state.apply(event) {
                    Ok(effects) => {
                        for effect in effects {
                            self.run_effect(effect).await;
                        }
                    }
                    Err(rejection) => {
                        tracing::warn!(
                            event = name,
                            status = self.state.status().as_str(),
                            "ignoring chat event that does not fit the session status"
                        );
                        self.notify(ChatNotice::RejectedEvent {
                            event: name,
                            rejection,
                        });
                    }
                }
                self.publish();
            }
            TransportEvent::Malformed { details } => {
                tracing::warn!(details = %details, "dropping malformed chat frame");
                self.notify(ChatNotice::MalformedFrame { details });
            }
        }
    }

    fn on_disconnected(&mut self, reason: Option<String>) {
        // Transports report a close and then drop their channel.
        if self.disconnect_reported {
            return;
        }
        self.disconnect_reported = true;
        tracing::info!(reason = ?reason, "chat connection lost");
        self.state.set_connected(false);
        self.typing.cancel();
        self.publish();
        self.notify(ChatNotice::Disconnected { reason });
    }

    async fn run_effect(&mut self, effect: SessionEffect) {
        match effect {
            SessionEffect::Persist(record) => {
                if let Err(error) = self.store.save(record).await {
                    self.persistence_failed(error.to_string());
                }
            }
            SessionEffect::ClearPersisted => {
                if let Err(error) = self.store.clear().await {
                    self.persistence_failed(error.to_string());
                }
            }
            SessionEffect::ServerError(message) => {
                tracing::warn!(message = %message, "chat server reported an error");
                self.notify(ChatNotice::ServerError { message });
            }
        }
    }

    async fn load_persisted(&mut self) -> Option<PersistedSession> {
        match self.store.load().await {
            Ok(record) => record,
            Err(error) => {
                self.persistence_failed(error.to_string());
                None
            }
        }
    }

    fn persistence_failed(&mut self, details: String) {
        tracing::warn!(details = %details, "session record persistence failed");
        self.notify(ChatNotice::PersistenceFailed { details });
    }

    fn emit(&mut self, event: OutboundEvent) -> ClientResult<()> {
        let name = event.name();
        if self.outbound.send(event).is_err() {
            self.state.set_connected(false);
            self.publish();
            return Err(ClientError::Rejected {
                stage: "emit-outbound",
                source: ActionError::NotConnected {
                    stage: "emit-outbound",
                },
            });
        }

        tracing::debug!(event = name, "queued chat event");
        Ok(())
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn notify(&self, notice: ChatNotice) {
        let _ = self.notices.send(notice);
    }
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

async fn wait_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
