//! Codec tests
//!
//! Exercises the STOMP 1.1 wire grammar: round-trips, heartbeat payloads,
//! body framing with and without content-length, and the malformed inputs
//! the decoder must reject.

use bytes::Bytes;
use pretty_assertions::assert_eq;

use super::{encode, Decoder, StompItem};
use crate::protocol::{Body, DecodeError, Frame};

fn decode(payload: &[u8]) -> Result<StompItem, DecodeError> {
    Decoder::new().decode(payload)
}

fn decode_frame(payload: &[u8]) -> Frame {
    match decode(payload).unwrap() {
        StompItem::Frame(frame) => frame,
        StompItem::Heartbeat => panic!("expected frame, got heartbeat"),
    }
}

// ============================================================================
// Round-trips
// ============================================================================

#[test]
fn roundtrip_text_body() {
    let frame = Frame::new("SEND")
        .header("destination", "/foo")
        .header("content-type", "text/plain")
        .body("hello");

    let encoded = encode(&frame);
    let decoded = decode_frame(&encoded);

    assert_eq!(decoded.command, "SEND");
    assert_eq!(decoded.headers.get("destination"), Some("/foo"));
    assert_eq!(decoded.headers.get("content-length"), Some("5"));
    assert_eq!(decoded.body, Body::Text("hello".to_string()));
}

#[test]
fn roundtrip_binary_body_with_content_length() {
    let payload = Bytes::from_static(&[0x00, 0x01, 0xFF, 0x0A]);
    let frame = Frame::new("SEND")
        .header("destination", "/bin")
        .header("content-type", "application/octet-stream")
        .body(payload.clone());

    let decoded = decode_frame(&encode(&frame));
    assert_eq!(decoded.body, Body::Binary(payload));
    assert_eq!(decoded.headers.get("content-length"), Some("4"));
}

#[test]
fn roundtrip_headers_preserved_in_order() {
    let frame = Frame::new("MESSAGE")
        .header("message-id", "msg-1")
        .header("destination", "/a.b")
        .header("subscription", "sub-0");

    let decoded = decode_frame(&encode(&frame));
    let names: Vec<&str> = decoded.headers.iter().map(|(k, _)| k).collect();
    assert_eq!(names, vec!["message-id", "destination", "subscription"]);
    assert_eq!(decoded.body, Body::Empty);
}

#[test]
fn roundtrip_empty_body_has_no_content_length() {
    let frame = Frame::new("DISCONNECT");
    let encoded = encode(&frame);
    assert_eq!(encoded.as_ref(), b"DISCONNECT\n\n\0");
    let decoded = decode_frame(&encoded);
    assert!(decoded.headers.is_empty());
}

#[test]
fn encode_respects_caller_content_length() {
    // body contains a NUL, so the explicit length is what frames it
    let frame = Frame::new("SEND")
        .header("destination", "/x")
        .header("content-length", "3")
        .body(Bytes::from_static(&[b'a', 0, b'b']));

    let decoded = decode_frame(&encode(&frame));
    assert_eq!(decoded.body, Body::Binary(Bytes::from_static(&[b'a', 0, b'b'])));
}

// ============================================================================
// Heartbeats
// ============================================================================

#[test]
fn single_lf_is_heartbeat() {
    assert_eq!(decode(b"\n").unwrap(), StompItem::Heartbeat);
    assert_eq!(decode(b"\r\n").unwrap(), StompItem::Heartbeat);
}

#[test]
fn heartbeat_helper_is_single_lf() {
    assert_eq!(super::heartbeat().as_ref(), b"\n");
}

// ============================================================================
// Grammar details
// ============================================================================

#[test]
fn duplicate_header_keeps_first_value() {
    let frame = decode_frame(b"SEND\ndestination:/first\ndestination:/second\n\n\0");
    assert_eq!(frame.headers.get("destination"), Some("/first"));
}

#[test]
fn crlf_lines_are_tolerated() {
    let frame = decode_frame(b"CONNECT\r\naccept-version:1.1\r\n\r\n\0");
    assert_eq!(frame.command, "CONNECT");
    assert_eq!(frame.headers.get("accept-version"), Some("1.1"));
}

#[test]
fn trailing_eols_after_terminator_are_tolerated() {
    let frame = decode_frame(b"SEND\ndestination:/foo\n\nhi\0\n\n");
    assert_eq!(frame.body, Body::Binary(Bytes::from_static(b"hi")));
}

#[test]
fn body_without_content_length_ends_at_first_nul() {
    let frame = decode_frame(b"SEND\ndestination:/foo\n\nhello\0");
    assert_eq!(frame.body, Body::Binary(Bytes::from_static(b"hello")));
}

#[test]
fn header_value_may_contain_spaces() {
    let frame = decode_frame(b"ERROR\nmessage:Command not found\n\n\0");
    assert_eq!(frame.headers.get("message"), Some("Command not found"));
}

#[test]
fn text_content_type_yields_text_body() {
    let frame = decode_frame(b"SEND\ncontent-type:text/plain\ndestination:/t\n\nhey\0");
    assert_eq!(frame.body, Body::Text("hey".to_string()));
}

#[test]
fn json_stays_binary_at_codec_level() {
    // application/json is refined to a structured value by the broker, not here
    let frame = decode_frame(b"SEND\ncontent-type:application/json\ndestination:/t\n\n{\"a\":1}\0");
    assert_eq!(frame.body, Body::Binary(Bytes::from_static(br#"{"a":1}"#)));
}

// ============================================================================
// Malformed frames
// ============================================================================

#[test]
fn missing_command_rejected() {
    // an empty command line followed by headers is not a heartbeat
    assert_eq!(decode(b"\ndestination:/x\n\n\0"), Err(DecodeError::MissingCommand));
    assert_eq!(decode(b"NONEWLINE"), Err(DecodeError::MissingCommand));
}

#[test]
fn header_without_colon_rejected() {
    assert_eq!(
        decode(b"SEND\ndestination\n\n\0"),
        Err(DecodeError::HeaderMissingColon)
    );
}

#[test]
fn missing_terminator_rejected() {
    assert_eq!(
        decode(b"SEND\ndestination:/foo\n\nhello"),
        Err(DecodeError::MissingNullTerminator)
    );
    assert_eq!(
        decode(b"SEND\ndestination:/foo"),
        Err(DecodeError::MissingNullTerminator)
    );
}

#[test]
fn content_length_mismatch_rejected() {
    // declared length runs past the end of the payload
    assert_eq!(
        decode(b"SEND\ndestination:/x\ncontent-length:99\n\nhi\0"),
        Err(DecodeError::ContentLengthMismatch)
    );
    // declared length lands on a non-NUL octet
    assert_eq!(
        decode(b"SEND\ndestination:/x\ncontent-length:1\n\nhi\0"),
        Err(DecodeError::ContentLengthMismatch)
    );
}

#[test]
fn bad_content_length_rejected() {
    assert_eq!(
        decode(b"SEND\ndestination:/x\ncontent-length:abc\n\nhi\0"),
        Err(DecodeError::InvalidContentLength)
    );
}

#[test]
fn trailing_garbage_rejected() {
    assert_eq!(
        decode(b"SEND\ndestination:/x\n\nhi\0junk"),
        Err(DecodeError::TrailingBytes)
    );
}

#[test]
fn oversized_frame_rejected() {
    let decoder = Decoder::new().with_max_frame_size(16);
    let payload = b"SEND\ndestination:/abcdefgh\n\nbody\0";
    assert_eq!(
        decoder.decode(payload),
        Err(DecodeError::FrameTooLarge(payload.len()))
    );
}

#[test]
fn invalid_utf8_in_header_rejected() {
    assert_eq!(
        decode(b"SEND\ndest\xFF:/x\n\n\0"),
        Err(DecodeError::InvalidUtf8)
    );
}
