#![deny(unsafe_code)]

/// Session actor that owns the chat connection.
pub mod client;
pub mod error;
pub mod transport;

pub use client::{ChatClient, ChatNotice, ChatNotices, ClientConfig};
pub use error::{ClientError, ClientResult};
pub use transport::{
    ChatTransport, MemoryPeer, MemoryTransport, TransportEvent, TransportHandle, TransportWorker,
    WebSocketTransport,
};
