//! STOMP 1.1 protocol types
//!
//! Defines the frame model shared by the codec, the middleware pipeline, and
//! the command handlers: the [`Frame`] itself, its ordered [`Headers`], the
//! typed [`Body`], and the classification of client commands.

mod error;

pub use error::{DecodeError, ProtocolError};

use bytes::Bytes;

/// STOMP protocol version spoken by this broker
pub const VERSION: &str = "1.1";

/// Server frame commands
pub const CONNECTED: &str = "CONNECTED";
pub const MESSAGE: &str = "MESSAGE";
pub const ERROR: &str = "ERROR";

/// Well-known header names
pub mod headers {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const DESTINATION: &str = "destination";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const ID: &str = "id";
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_ID: &str = "message-id";
    pub const SERVER: &str = "server";
    pub const SESSION: &str = "session";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const VERSION: &str = "version";
}

/// Client commands the broker dispatches, after folding `STOMP` into
/// `CONNECT`. Each variant owns one middleware chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
}

/// Number of [`Command`] variants; sizes the middleware chain table.
pub const COMMAND_COUNT: usize = 5;

impl Command {
    /// Classify a wire command line. Returns `None` for commands outside the
    /// supported set (they draw an ERROR frame at the session layer).
    pub fn classify(command: &str) -> Option<Self> {
        match command {
            "CONNECT" | "STOMP" => Some(Self::Connect),
            "SEND" => Some(Self::Send),
            "SUBSCRIBE" => Some(Self::Subscribe),
            "UNSUBSCRIBE" => Some(Self::Unsubscribe),
            "DISCONNECT" => Some(Self::Disconnect),
            _ => None,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Connect => 0,
            Self::Send => 1,
            Self::Subscribe => 2,
            Self::Unsubscribe => 3,
            Self::Disconnect => 4,
        }
    }
}

/// Ordered header collection
///
/// STOMP 1.1 headers are an ordered list of `name:value` pairs; lookup
/// returns the first occurrence. The parser relies on [`Headers::contains`]
/// to keep the first value when a client repeats a header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any iterator of name/value pairs (appended in order).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    /// Replace the first occurrence of `name`, or append if absent.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value.into(),
            None => self.entries.push((name.to_string(), value.into())),
        }
    }

    /// Append unconditionally, preserving any existing occurrence.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove the first occurrence of `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Frame body
///
/// The codec produces `Empty`, `Text` (for `text/*` content types with valid
/// UTF-8), or `Binary`. The broker converts `application/json` bodies to
/// `Json` before middleware runs, and serializes structured values back to
/// JSON text on the way out.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Text(String),
    Binary(Bytes),
    Json(serde_json::Value),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// Serialized octets of the body. `Json` renders as compact JSON text.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Body::Empty => Bytes::new(),
            Body::Text(s) => Bytes::copy_from_slice(s.as_bytes()),
            Body::Binary(b) => b.clone(),
            Body::Json(v) => Bytes::from(v.to_string()),
        }
    }

    /// Raw octets for content types that carry text or binary payloads.
    pub fn as_slice(&self) -> Option<&[u8]> {
        match self {
            Body::Empty | Body::Json(_) => None,
            Body::Text(s) => Some(s.as_bytes()),
            Body::Binary(b) => Some(b),
        }
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Binary(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Binary(Bytes::from(b))
    }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self {
        Body::Json(v)
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: String,
    pub headers: Headers,
    pub body: Body,
}

impl Frame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Headers::new(),
            body: Body::Empty,
        }
    }

    /// Builder-style header append.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Builder-style body assignment.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }
}
