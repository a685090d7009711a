//! Per-session command handling
//!
//! A [`Connection`] is the inbound surface of one session: the transport
//! layer (or a test harness) pushes each message-framed payload into
//! [`Connection::feed`], which decodes it and dispatches through the
//! middleware pipeline to the terminal handler for the command. All calls
//! for one session arrive from a single task, so handlers never interleave
//! within a session.

mod connect;
mod disconnect;
mod send;
mod subscribe;

pub(crate) use send::decode_json_body;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{BrokerConfig, BrokerEvent, MessageRouter};
use crate::codec::{self, Decoder, StompItem};
use crate::destination::SubscriptionStore;
use crate::middleware::Pipeline;
use crate::protocol::{headers, Body, Command, Frame, ProtocolError, ERROR};
use crate::session::{Session, SessionState, SessionStore};

/// Inbound handle for one session
#[derive(Clone)]
pub struct Connection {
    pub(crate) session: Arc<Session>,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) subscriptions: Arc<SubscriptionStore>,
    pub(crate) pipeline: Arc<Pipeline>,
    pub(crate) router: Arc<MessageRouter>,
    pub(crate) events: broadcast::Sender<BrokerEvent>,
    pub(crate) config: Arc<BrokerConfig>,
    decoder: Decoder,
}

impl Connection {
    pub(crate) fn new(
        session: Arc<Session>,
        sessions: Arc<SessionStore>,
        subscriptions: Arc<SubscriptionStore>,
        pipeline: Arc<Pipeline>,
        router: Arc<MessageRouter>,
        events: broadcast::Sender<BrokerEvent>,
        config: Arc<BrokerConfig>,
    ) -> Self {
        let decoder = Decoder::new().with_max_frame_size(config.max_frame_size);
        Self {
            session,
            sessions,
            subscriptions,
            pipeline,
            router,
            events,
            config,
            decoder,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn session_id(&self) -> &Arc<str> {
        self.session.id()
    }

    /// Whether teardown has started; callers should stop feeding payloads.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.session.state(),
            SessionState::Closing | SessionState::Closed
        )
    }

    /// Process one transport payload: the `on-message` entry point.
    pub async fn feed(&self, payload: &[u8]) {
        self.session.touch();
        match self.decoder.decode(payload) {
            Ok(StompItem::Heartbeat) => {}
            Ok(StompItem::Frame(frame)) => self.dispatch(frame).await,
            Err(e) => {
                warn!(session = %self.session_id(), "malformed frame: {}", e);
                self.send_error(
                    &ProtocolError::from(e),
                    Some(Bytes::copy_from_slice(payload)),
                )
                .await;
                self.teardown().await;
            }
        }
    }

    /// The transport closed: the `on-close` entry point.
    pub async fn closed(&self) {
        self.teardown().await;
    }

    /// The transport failed: the `on-error` entry point. Surfaces the error
    /// to the host and treats the session as closed.
    pub async fn failed(&self, error: impl std::fmt::Display) {
        let message = error.to_string();
        debug!(session = %self.session_id(), "transport error: {}", message);
        let _ = self.events.send(BrokerEvent::Error {
            session_id: Some(self.session_id().clone()),
            message,
        });
        self.teardown().await;
    }

    async fn dispatch(&self, frame: Frame) {
        if self.is_closed() {
            return;
        }

        let command = Command::classify(&frame.command);

        // Before CONNECT only CONNECT/STOMP is admissible
        if !self.session.is_connected() && command != Some(Command::Connect) {
            self.send_error(&ProtocolError::NotConnected, Some(frame_bytes(&frame)))
                .await;
            self.teardown().await;
            return;
        }

        match command {
            Some(Command::Connect) => self.handle_connect(frame).await,
            Some(Command::Send) => self.handle_send(frame).await,
            Some(Command::Subscribe) => self.handle_subscribe(frame).await,
            Some(Command::Unsubscribe) => self.handle_unsubscribe(frame).await,
            Some(Command::Disconnect) => self.handle_disconnect(frame).await,
            None => {
                warn!(
                    session = %self.session_id(),
                    command = %frame.command,
                    "unsupported command"
                );
                self.send_error(
                    &ProtocolError::UnknownCommand(frame.command.clone()),
                    Some(frame_bytes(&frame)),
                )
                .await;
            }
        }
    }

    /// Write a frame to this session's transport. Write failures are
    /// reported as events, not propagated; the peer going away surfaces
    /// through the transport close path.
    pub(crate) async fn send_frame(&self, frame: &Frame) {
        if let Some(transport) = self.session.transport() {
            if let Err(e) = transport.send(codec::encode(frame)).await {
                debug!(session = %self.session_id(), "write failed: {}", e);
                let _ = self.events.send(BrokerEvent::Error {
                    session_id: Some(self.session_id().clone()),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Send an ERROR frame with the failure as the `message` header and,
    /// when available, the offending frame repeated in the body.
    pub(crate) async fn send_error(&self, error: &ProtocolError, offending: Option<Bytes>) {
        let mut frame = Frame::new(ERROR).header(headers::MESSAGE, error.to_string());
        if let Some(bytes) = offending {
            frame.headers.set(headers::CONTENT_TYPE, "text/plain");
            frame.body = Body::Binary(bytes);
        }
        self.send_frame(&frame).await;
    }
}

/// Serialized form of a frame for ERROR bodies, without the trailing NUL.
pub(crate) fn frame_bytes(frame: &Frame) -> Bytes {
    let encoded = codec::encode(frame);
    encoded.slice(..encoded.len() - 1)
}

/// Generate a random id
pub(crate) fn rand_id() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish()
}
