//! STOMP frame codec
//!
//! Parses and serializes frames per the STOMP 1.1 wire grammar:
//! `COMMAND LF (HEADER LF)* LF BODY NUL`. The transport is message-framed
//! (one WebSocket payload per frame), so the decoder consumes exactly one
//! frame per input buffer. A payload consisting of a single LF is a
//! heartbeat, reported as [`StompItem::Heartbeat`] rather than a frame.

#[cfg(test)]
mod tests;

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::{headers, Body, DecodeError, Frame, Headers};

/// Default maximum frame size (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Outcome of decoding one transport payload
#[derive(Debug, Clone, PartialEq)]
pub enum StompItem {
    /// A complete STOMP frame
    Frame(Frame),
    /// A bare LF liveness beacon; never dispatched as a frame
    Heartbeat,
}

/// Frame decoder
///
/// Stateless apart from the configured size limit, so it is freely cloneable
/// into per-connection handlers.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    max_frame_size: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Decode a single transport payload into a frame or heartbeat.
    pub fn decode(&self, payload: &[u8]) -> Result<StompItem, DecodeError> {
        if payload == b"\n" || payload == b"\r\n" {
            return Ok(StompItem::Heartbeat);
        }
        if payload.len() > self.max_frame_size {
            return Err(DecodeError::FrameTooLarge(payload.len()));
        }

        let nl = payload
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(DecodeError::MissingCommand)?;
        let command = line_str(&payload[..nl])?;
        if command.is_empty() {
            return Err(DecodeError::MissingCommand);
        }

        let mut parsed = Headers::new();
        let mut pos = nl + 1;
        loop {
            let line_end = payload[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| pos + i)
                .ok_or(DecodeError::MissingNullTerminator)?;
            let line = &payload[pos..line_end];
            pos = line_end + 1;
            let line = strip_cr(line);
            if line.is_empty() {
                break;
            }
            let colon = line
                .iter()
                .position(|&b| b == b':')
                .ok_or(DecodeError::HeaderMissingColon)?;
            let name = bytes_str(&line[..colon])?;
            let value = bytes_str(&line[colon + 1..])?;
            // STOMP 1.1: only the first occurrence of a repeated header is used
            if !parsed.contains(name) {
                parsed.push(name, value);
            }
        }

        let (raw_body, rest) = match parsed.get(headers::CONTENT_LENGTH) {
            Some(declared) => {
                let len: usize = declared
                    .trim()
                    .parse()
                    .map_err(|_| DecodeError::InvalidContentLength)?;
                let body_end = pos + len;
                if body_end >= payload.len() || payload[body_end] != 0 {
                    return Err(DecodeError::ContentLengthMismatch);
                }
                (&payload[pos..body_end], body_end + 1)
            }
            None => {
                let nul = payload[pos..]
                    .iter()
                    .position(|&b| b == 0)
                    .map(|i| pos + i)
                    .ok_or(DecodeError::MissingNullTerminator)?;
                (&payload[pos..nul], nul + 1)
            }
        };

        if payload[rest..].iter().any(|&b| b != b'\n' && b != b'\r') {
            return Err(DecodeError::TrailingBytes);
        }

        let body = classify_body(raw_body, parsed.get(headers::CONTENT_TYPE));
        Ok(StompItem::Frame(Frame {
            command: command.to_string(),
            headers: parsed,
            body,
        }))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a frame to wire octets.
///
/// Headers are written in order. If the body is non-empty and the caller did
/// not supply `content-length`, one is appended with the body's octet length.
pub fn encode(frame: &Frame) -> Bytes {
    let body = frame.body.to_bytes();
    let mut buf = BytesMut::with_capacity(frame.command.len() + body.len() + 64);

    buf.put_slice(frame.command.as_bytes());
    buf.put_u8(b'\n');

    let mut wrote_length = false;
    for (name, value) in frame.headers.iter() {
        buf.put_slice(name.as_bytes());
        buf.put_u8(b':');
        buf.put_slice(value.as_bytes());
        buf.put_u8(b'\n');
        if name == headers::CONTENT_LENGTH {
            wrote_length = true;
        }
    }
    if !body.is_empty() && !wrote_length {
        buf.put_slice(headers::CONTENT_LENGTH.as_bytes());
        buf.put_u8(b':');
        buf.put_slice(body.len().to_string().as_bytes());
        buf.put_u8(b'\n');
    }

    buf.put_u8(b'\n');
    buf.put_slice(&body);
    buf.put_u8(0);
    buf.freeze()
}

/// A single LF, the server-side liveness beacon.
pub fn heartbeat() -> Bytes {
    Bytes::from_static(b"\n")
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn line_str(line: &[u8]) -> Result<&str, DecodeError> {
    bytes_str(strip_cr(line))
}

fn bytes_str(bytes: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
}

fn classify_body(raw: &[u8], content_type: Option<&str>) -> Body {
    if raw.is_empty() {
        return Body::Empty;
    }
    let is_text = content_type
        .map(|ct| ct.trim_start().starts_with("text/"))
        .unwrap_or(false);
    if is_text {
        if let Ok(text) = std::str::from_utf8(raw) {
            return Body::Text(text.to_string());
        }
    }
    Body::Binary(Bytes::copy_from_slice(raw))
}
