//! Protocol error types

use std::fmt;

/// Errors that can occur while decoding a STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The command line is missing or empty
    MissingCommand,
    /// A header line has no colon separator
    HeaderMissingColon,
    /// The command line or a header is not valid UTF-8
    InvalidUtf8,
    /// The content-length header is not a valid integer
    InvalidContentLength,
    /// The content-length header does not match the body length
    ContentLengthMismatch,
    /// The frame terminator (NUL) is absent
    MissingNullTerminator,
    /// Octets other than CR/LF follow the frame terminator
    TrailingBytes,
    /// Frame exceeds the configured maximum size
    FrameTooLarge(usize),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCommand => write!(f, "missing command line"),
            Self::HeaderMissingColon => write!(f, "header line has no colon"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 in command or header"),
            Self::InvalidContentLength => write!(f, "invalid content-length header"),
            Self::ContentLengthMismatch => {
                write!(f, "content-length does not match body length")
            }
            Self::MissingNullTerminator => write!(f, "missing frame terminator"),
            Self::TrailingBytes => write!(f, "unexpected octets after frame terminator"),
            Self::FrameTooLarge(size) => write!(f, "frame too large: {} bytes", size),
        }
    }
}

impl std::error::Error for DecodeError {}

/// High-level protocol errors
///
/// These map onto ERROR frames sent to the offending session; the `Display`
/// text becomes the `message` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame decoding failed
    Decode(DecodeError),
    /// Command received before a successful CONNECT
    NotConnected,
    /// CONNECT received on an already connected session
    AlreadyConnected,
    /// A required header is absent
    MissingHeader(&'static str),
    /// SUBSCRIBE reused an id already active on the session
    DuplicateSubscription(String),
    /// accept-version does not include a supported version
    UnsupportedVersion(String),
    /// Command is not part of the supported client command set
    UnknownCommand(String),
    /// Body declared application/json but failed to parse
    InvalidJsonBody(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "malformed frame: {}", e),
            Self::NotConnected => write!(f, "session is not connected"),
            Self::AlreadyConnected => write!(f, "session is already connected"),
            Self::MissingHeader(name) => write!(f, "missing required header: {}", name),
            Self::DuplicateSubscription(id) => {
                write!(f, "subscription id already in use: {}", id)
            }
            Self::UnsupportedVersion(versions) => {
                write!(f, "unsupported protocol versions: {}", versions)
            }
            Self::UnknownCommand(_) => write!(f, "Command not found"),
            Self::InvalidJsonBody(msg) => write!(f, "invalid JSON body: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<DecodeError> for ProtocolError {
    fn from(e: DecodeError) -> Self {
        ProtocolError::Decode(e)
    }
}
