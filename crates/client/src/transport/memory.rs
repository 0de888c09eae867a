use std::sync::Mutex;

use livechat_core::{InboundEvent, OutboundEvent};
use tokio::sync::mpsc;

use super::{ChatTransport, TransportEvent, TransportHandle, TransportWorker, map_text_frame};
use crate::error::{ClientResult, TransportUnavailableSnafu};

pub const MEMORY_TRANSPORT_ID: &str = "memory";

type ClientEnds = (
    mpsc::UnboundedSender<OutboundEvent>,
    mpsc::UnboundedReceiver<TransportEvent>,
);

/// In-process transport; the paired [`MemoryPeer`] plays the chat server.
pub struct MemoryTransport {
    ends: Mutex<Option<ClientEnds>>,
}

/// Server side of a [`MemoryTransport`].
pub struct MemoryPeer {
    outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryTransport {
    pub fn pair() -> (Self, MemoryPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                ends: Mutex::new(Some((outbound_tx, inbound_rx))),
            },
            MemoryPeer {
                outbound: outbound_rx,
                inbound: inbound_tx,
            },
        )
    }
}

impl ChatTransport for MemoryTransport {
    fn id(&self) -> &str {
        MEMORY_TRANSPORT_ID
    }

    fn open(&self) -> ClientResult<TransportHandle> {
        let ends = self.ends.lock().ok().and_then(|mut ends| ends.take());
        let Some((outbound, inbound)) = ends else {
            return TransportUnavailableSnafu {
                stage: "memory-transport-open",
                transport_id: MEMORY_TRANSPORT_ID,
            }
            .fail();
        };

        let worker: TransportWorker = Box::pin(std::future::ready(()));
        Ok(TransportHandle {
            outbound,
            inbound,
            worker,
        })
    }
}

impl MemoryPeer {
    pub fn connect(&self) -> bool {
        self.inbound.send(TransportEvent::Connected).is_ok()
    }

    pub fn disconnect(&self, reason: Option<&str>) -> bool {
        self.inbound
            .send(TransportEvent::Disconnected {
                reason: reason.map(str::to_string),
            })
            .is_ok()
    }

    pub fn push(&self, event: InboundEvent) -> bool {
        self.inbound.send(TransportEvent::Frame(event)).is_ok()
    }

    /// Delivers a raw text frame exactly as a socket would.
    pub fn push_raw(&self, raw: &str) -> bool {
        self.inbound.send(map_text_frame(raw)).is_ok()
    }

    pub async fn next_outbound(&mut self) -> Option<OutboundEvent> {
        self.outbound.recv().await
    }

    pub fn try_outbound(&mut self) -> Option<OutboundEvent> {
        self.outbound.try_recv().ok()
    }
}
