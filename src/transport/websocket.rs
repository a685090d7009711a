//! WebSocket transport
//!
//! Accepts WebSocket upgrades with path validation and STOMP subprotocol
//! negotiation, and wraps the write half in a [`Transport`] the broker core
//! can hand to a session. Each WebSocket message carries exactly one STOMP
//! frame or a single-LF heartbeat.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

use super::{Transport, TransportError};

/// STOMP subprotocol identifiers we echo back to the client
const SUBPROTOCOLS: [&str; 3] = ["v11.stomp", "v10.stomp", "stomp"];

/// An accepted WebSocket connection, split into the broker-facing transport
/// and the inbound message stream.
pub struct WsConn {
    pub transport: std::sync::Arc<WsTransport>,
    pub incoming: SplitStream<WebSocketStream<TcpStream>>,
}

/// Write half of a WebSocket connection
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>,
    open: AtomicBool,
}

impl WsTransport {
    fn new(sink: SplitSink<WebSocketStream<TcpStream>, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let mut sink = self.sink.lock().await;
        match sink.send(Message::Binary(payload.to_vec())).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.open.store(false, Ordering::Release);
                Err(TransportError::Io(io::Error::other(e)))
            }
        }
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.flush().await;
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Perform the WebSocket handshake on an accepted TCP stream, validating the
/// upgrade path and echoing a STOMP subprotocol when the client offers one.
pub async fn accept(stream: TcpStream, expected_path: &str) -> Result<WsConn, io::Error> {
    let expected_path = expected_path.to_string();

    let ws = tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, mut response: Response| {
        let request_path = req.uri().path();
        if request_path != expected_path {
            return Err(ErrorResponse::new(Some(format!(
                "Invalid path: expected '{}', got '{}'",
                expected_path, request_path
            ))));
        }

        if let Some(protocols) = req.headers().get("sec-websocket-protocol") {
            if let Ok(protocols_str) = protocols.to_str() {
                for protocol in protocols_str.split(',').map(|s| s.trim()) {
                    if SUBPROTOCOLS.contains(&protocol) {
                        if let Ok(value) = protocol.parse() {
                            response
                                .headers_mut()
                                .insert("sec-websocket-protocol", value);
                        }
                        break;
                    }
                }
            }
        }
        Ok(response)
    })
    .await
    .map_err(io::Error::other)?;

    let (sink, incoming) = ws.split();
    Ok(WsConn {
        transport: std::sync::Arc::new(WsTransport::new(sink)),
        incoming,
    })
}
