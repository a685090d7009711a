//! Heartbeat negotiation and timeout arithmetic
//!
//! STOMP 1.1 heartbeats are bare LF octets exchanged on the negotiated
//! cadence. The broker advertises a `[sx, sy]` pair (how often it can send,
//! how often it wants to receive); the client sends `heart-beat: cx,cy`.
//! Each direction is enabled only when both sides are non-zero, and the
//! effective interval is the maximum of the two. The per-session timers that
//! act on these values live with the connection handler.

use std::cmp::max;

/// Negotiated heartbeat intervals, in milliseconds. Zero disables a
/// direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heartbeat {
    /// Server-to-client beacon interval (`sx'`)
    pub server_send_ms: u64,
    /// Expected client-to-server traffic interval (`rx'`)
    pub client_receive_ms: u64,
}

impl Heartbeat {
    /// Negotiate against the broker's configured `[sx, sy]` pair and the
    /// client's `(cx, cy)` request.
    pub fn negotiate(configured: [u64; 2], client: (u64, u64)) -> Self {
        let [sx, sy] = configured;
        let (cx, cy) = client;
        Self {
            server_send_ms: if sx != 0 && cy != 0 { max(sx, cy) } else { 0 },
            client_receive_ms: if sy != 0 && cx != 0 { max(sy, cx) } else { 0 },
        }
    }

    /// Value for the CONNECTED `heart-beat` header.
    pub fn header_value(&self) -> String {
        format!("{},{}", self.server_send_ms, self.client_receive_ms)
    }

    pub fn is_disabled(&self) -> bool {
        self.server_send_ms == 0 && self.client_receive_ms == 0
    }
}

/// Parse a `heart-beat: cx,cy` header value. Missing or unparsable fields
/// default to zero (heartbeats disabled in that direction).
pub fn parse_header(value: &str) -> (u64, u64) {
    let mut parts = value.split(',');
    let cx = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let cy = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    (cx, cy)
}

/// Whether a session has gone silent past the tolerated window.
pub fn timed_out(since_last_rx_ms: u64, interval_ms: u64, margin_ms: u64) -> bool {
    since_last_rx_ms > interval_ms.saturating_add(margin_ms)
}
