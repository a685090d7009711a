//! CONNECT / STOMP handling and heartbeat timers

use std::time::Duration;

use tracing::{debug, info, trace};

use super::{frame_bytes, Connection};
use crate::codec;
use crate::heartbeat::{self, Heartbeat};
use crate::middleware::Flow;
use crate::protocol::{headers, Command, Frame, ProtocolError, CONNECTED, VERSION};
use crate::broker::BrokerEvent;

impl Connection {
    pub(crate) async fn handle_connect(&self, mut frame: Frame) {
        if self.session.is_connected() {
            self.send_error(&ProtocolError::AlreadyConnected, Some(frame_bytes(&frame)))
                .await;
            self.teardown().await;
            return;
        }

        if self
            .pipeline
            .dispatch(Command::Connect, &self.session, &mut frame)
            .await
            == Flow::Halt
        {
            debug!(session = %self.session_id(), "CONNECT dropped by middleware");
            return;
        }

        // Lenient: an absent accept-version implies 1.1 is acceptable
        if let Some(versions) = frame.headers.get(headers::ACCEPT_VERSION) {
            if !versions.split(',').any(|v| v.trim() == VERSION) {
                self.send_error(
                    &ProtocolError::UnsupportedVersion(versions.to_string()),
                    Some(frame_bytes(&frame)),
                )
                .await;
                self.teardown().await;
                return;
            }
        }

        let client = heartbeat::parse_header(frame.headers.get(headers::HEART_BEAT).unwrap_or("0,0"));
        let negotiated = Heartbeat::negotiate(self.config.heartbeat, client);
        self.session.set_heartbeat(negotiated);

        if !self.session.mark_connected() {
            // lost a race with teardown
            return;
        }

        let connected = Frame::new(CONNECTED)
            .header(headers::VERSION, VERSION)
            .header(headers::SERVER, self.config.server_name.as_str())
            .header(headers::SESSION, self.session_id().as_ref())
            .header(headers::HEART_BEAT, negotiated.header_value());
        self.send_frame(&connected).await;

        self.arm_heartbeat(negotiated);

        let _ = self.events.send(BrokerEvent::Connected {
            session_id: self.session_id().clone(),
            headers: connected.headers.clone(),
        });
        info!(
            session = %self.session_id(),
            heartbeat = %negotiated.header_value(),
            "session connected"
        );
    }

    /// Arm the negotiated per-session timers. Both are cancelled by
    /// teardown; each also exits on its own once the session is closing.
    fn arm_heartbeat(&self, negotiated: Heartbeat) {
        if negotiated.server_send_ms > 0 {
            let conn = self.clone();
            let interval = Duration::from_millis(negotiated.server_send_ms);
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // discard the immediate first tick
                loop {
                    ticker.tick().await;
                    if conn.is_closed() {
                        break;
                    }
                    let Some(transport) = conn.session.transport() else {
                        break;
                    };
                    if !transport.is_open() || transport.send(codec::heartbeat()).await.is_err() {
                        conn.teardown().await;
                        break;
                    }
                    trace!(session = %conn.session_id(), "heartbeat sent");
                }
            });
            self.session.register_timer(handle);
        }

        if negotiated.client_receive_ms > 0 {
            let conn = self.clone();
            let interval_ms = negotiated.client_receive_ms;
            let margin_ms = self.config.heartbeat_error_margin_ms;
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if conn.is_closed() {
                        break;
                    }
                    let silent_ms = conn.session.millis_since_last_rx();
                    if heartbeat::timed_out(silent_ms, interval_ms, margin_ms) {
                        info!(
                            session = %conn.session_id(),
                            silent_ms,
                            "heartbeat timeout, closing session"
                        );
                        conn.teardown().await;
                        break;
                    }
                    trace!(session = %conn.session_id(), silent_ms, "heartbeat check passed");
                }
            });
            self.session.register_timer(handle);
        }
    }
}
