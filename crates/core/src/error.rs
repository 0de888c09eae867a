use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CoreError {
    #[snafu(display("{id_type} must not be empty"))]
    EmptyId {
        stage: &'static str,
        id_type: &'static str,
    },
    #[snafu(display("failed to encode outbound frame on `{stage}`: {source}"))]
    EncodeFrame {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to decode inbound frame on `{stage}`: {source}"))]
    DecodeFrame {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Reasons an outbound action was refused before anything reached the wire.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ActionError {
    #[snafu(display("chat connection is not established"))]
    NotConnected { stage: &'static str },
    #[snafu(display("visitor name must not be empty"))]
    EmptyVisitorName { stage: &'static str },
    #[snafu(display("message text must not be blank"))]
    BlankMessage { stage: &'static str },
    #[snafu(display("no chat session is open"))]
    NoSession { stage: &'static str },
    #[snafu(display("a chat session is already being started"))]
    StartPending { stage: &'static str },
}

pub type ActionResult<T> = Result<T, ActionError>;
