//! SEND handling

use tracing::debug;

use super::{frame_bytes, Connection};
use crate::middleware::Flow;
use crate::protocol::{headers, Body, Command, Frame, ProtocolError};

/// Decode an `application/json` body into a structured value before the
/// middleware chain sees the frame. Other content types pass through
/// unchanged.
pub(crate) fn decode_json_body(frame: &mut Frame) -> Result<(), ProtocolError> {
    let is_json = frame
        .headers
        .get(headers::CONTENT_TYPE)
        .map(|ct| ct.trim_start().starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Ok(());
    }
    let Some(raw) = frame.body.as_slice() else {
        return Ok(());
    };
    match serde_json::from_slice(raw) {
        Ok(value) => {
            frame.body = Body::Json(value);
            Ok(())
        }
        Err(e) => Err(ProtocolError::InvalidJsonBody(e.to_string())),
    }
}

impl Connection {
    pub(crate) async fn handle_send(&self, mut frame: Frame) {
        if let Err(e) = decode_json_body(&mut frame) {
            self.send_error(&e, Some(frame_bytes(&frame))).await;
            return;
        }

        if self
            .pipeline
            .dispatch(Command::Send, &self.session, &mut frame)
            .await
            == Flow::Halt
        {
            debug!(session = %self.session_id(), "SEND dropped by middleware");
            return;
        }

        if frame.headers.get(headers::DESTINATION).is_none() {
            self.send_error(
                &ProtocolError::MissingHeader(headers::DESTINATION),
                Some(frame_bytes(&frame)),
            )
            .await;
            return;
        }

        let delivered = self.router.route(self.session_id(), frame).await;
        debug!(session = %self.session_id(), delivered, "SEND routed");
    }
}
