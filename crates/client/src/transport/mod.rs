use std::future::Future;
use std::pin::Pin;

use livechat_core::{InboundEvent, OutboundEvent, decode_frame};
use tokio::sync::mpsc;

use crate::error::ClientResult;

pub mod memory;
pub mod websocket;

pub use memory::{MemoryPeer, MemoryTransport};
pub use websocket::WebSocketTransport;

pub type TransportWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// What the transport reports to the session actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: Option<String> },
    Frame(InboundEvent),
    Malformed { details: String },
}

/// Channel ends handed to the session actor, plus the IO future that drives them.
pub struct TransportHandle {
    pub outbound: mpsc::UnboundedSender<OutboundEvent>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
    pub worker: TransportWorker,
}

pub trait ChatTransport: Send + Sync {
    fn id(&self) -> &str;
    fn open(&self) -> ClientResult<TransportHandle>;
}

pub(crate) fn map_text_frame(raw: &str) -> TransportEvent {
    match decode_frame(raw) {
        Ok(event) => TransportEvent::Frame(event),
        Err(error) => TransportEvent::Malformed {
            details: error.to_string(),
        },
    }
}
