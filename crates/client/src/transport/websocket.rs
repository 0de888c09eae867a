use futures::{SinkExt, StreamExt};
use livechat_core::{OutboundEvent, encode_frame};
use snafu::ensure;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{ChatTransport, TransportEvent, TransportHandle, TransportWorker, map_text_frame};
use crate::error::{ClientResult, InvalidServerUrlSnafu};

pub const WEBSOCKET_TRANSPORT_ID: &str = "websocket";

/// JSON text frames over a single WebSocket connection. No reconnect logic.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> ClientResult<Self> {
        let url = url.into().trim().to_string();
        ensure!(
            url.starts_with("ws://") || url.starts_with("wss://"),
            InvalidServerUrlSnafu {
                stage: "websocket-transport-new",
                url,
            }
        );

        Ok(Self { url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn run_socket_worker(
        url: String,
        mut outbound_rx: mpsc::UnboundedReceiver<OutboundEvent>,
        inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let socket = match connect_async(url.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(source) => {
                tracing::warn!(url = %url, error = %source, "failed to open chat socket");
                let _ = inbound_tx.send(TransportEvent::Disconnected {
                    reason: Some(source.to_string()),
                });
                return;
            }
        };

        tracing::info!(url = %url, "chat socket connected");
        if inbound_tx.send(TransportEvent::Connected).is_err() {
            return;
        }

        let (mut sink, mut stream) = socket.split();
        let mut reason = None;

        loop {
            tokio::select! {
                outbound = outbound_rx.recv() => {
                    let Some(event) = outbound else {
                        // Session actor is gone; close politely.
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    };

                    let frame = match encode_frame(&event) {
                        Ok(frame) => frame,
                        Err(error) => {
                            tracing::warn!(event = event.name(), error = %error, "dropping unencodable chat frame");
                            continue;
                        }
                    };

                    tracing::debug!(event = event.name(), "sending chat frame");
                    if let Err(source) = sink.send(Message::Text(frame)).await {
                        reason = Some(source.to_string());
                        break;
                    }
                }
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if inbound_tx.send(map_text_frame(&text)).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            reason = frame.map(|frame| frame.reason.to_string());
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(source)) => {
                            tracing::warn!(url = %url, error = %source, "chat socket read failed");
                            reason = Some(source.to_string());
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::info!(url = %url, reason = ?reason, "chat socket closed");
        let _ = inbound_tx.send(TransportEvent::Disconnected { reason });
    }
}

impl ChatTransport for WebSocketTransport {
    fn id(&self) -> &str {
        WEBSOCKET_TRANSPORT_ID
    }

    fn open(&self) -> ClientResult<TransportHandle> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let worker: TransportWorker = Box::pin(Self::run_socket_worker(
            self.url.clone(),
            outbound_rx,
            inbound_tx,
        ));

        Ok(TransportHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
            worker,
        })
    }
}
