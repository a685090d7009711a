//! DISCONNECT handling and session teardown

use tracing::debug;

use super::Connection;
use crate::broker::BrokerEvent;
use crate::middleware::Flow;
use crate::protocol::{Command, Frame};

impl Connection {
    pub(crate) async fn handle_disconnect(&self, mut frame: Frame) {
        if self
            .pipeline
            .dispatch(Command::Disconnect, &self.session, &mut frame)
            .await
            == Flow::Halt
        {
            debug!(session = %self.session_id(), "DISCONNECT dropped by middleware");
            return;
        }
        debug!(session = %self.session_id(), "DISCONNECT");
        self.teardown().await;
    }

    /// Tear the session down. Idempotent: the first caller claims the
    /// transition to `Closing` and does the work; later callers return
    /// immediately. Runs on DISCONNECT, transport close or error, and
    /// heartbeat timeout.
    pub(crate) async fn teardown(&self) {
        if !self.session.begin_teardown() {
            return;
        }
        let session_id = self.session_id().clone();

        let removed = self.subscriptions.remove_session(&session_id);
        if removed > 0 {
            debug!(session = %session_id, removed, "dropped subscriptions");
        }

        if let Some(transport) = self.session.transport() {
            if transport.is_open() {
                transport.close().await;
            }
        }

        self.sessions.remove(&session_id);
        self.session.mark_closed();
        let _ = self.events.send(BrokerEvent::Disconnected {
            session_id: session_id.clone(),
        });
        debug!(session = %session_id, "session closed");

        // Cancel timers last: the caller may itself be a heartbeat timer,
        // and aborting it earlier would cut teardown short.
        self.session.abort_timers();
    }
}
