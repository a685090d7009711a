//! Transport abstraction
//!
//! The broker core is transport-agnostic: a session owns an object
//! implementing [`Transport`] for writes, while inbound payloads are pushed
//! into the session through [`crate::broker::Connection::feed`]. The
//! WebSocket adapter in [`websocket`] is the shipped implementation; the
//! [`MockTransport`] records writes in memory for tests and embedding
//! experiments.

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::{accept, WsConn, WsTransport};

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

/// Transport failure surfaced to the broker
#[derive(Debug)]
pub enum TransportError {
    /// The peer is gone or the transport was closed locally
    Closed,
    /// Underlying I/O failure
    Io(std::io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Io(e) => write!(f, "transport io error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Write side of a connected peer
///
/// `send` delivers one message-framed payload (a serialized frame or a
/// single-LF heartbeat). Implementations serialize concurrent senders
/// internally; the broker never holds shared locks across these calls.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: Bytes) -> Result<(), TransportError>;
    async fn close(&self);
    fn is_open(&self) -> bool;
}
