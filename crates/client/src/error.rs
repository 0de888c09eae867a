use livechat_core::ActionError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    #[snafu(display("chat action rejected on `{stage}`: {source}"))]
    Rejected {
        stage: &'static str,
        source: ActionError,
    },
    #[snafu(display("chat session actor is no longer running"))]
    ActorStopped { stage: &'static str },
    #[snafu(display("chat server URL '{url}' must use ws:// or wss://"))]
    InvalidServerUrl { stage: &'static str, url: String },
    #[snafu(display("transport '{transport_id}' cannot be opened again"))]
    TransportUnavailable {
        stage: &'static str,
        transport_id: String,
    },
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// The validation or connection failure behind a rejected action, if any.
    pub fn action_error(&self) -> Option<&ActionError> {
        match self {
            Self::Rejected { source, .. } => Some(source),
            _ => None,
        }
    }
}
