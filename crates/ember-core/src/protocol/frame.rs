//! Streaming, incremental decoder and encoder for the RESP-style frame format.
//!
//! `FrameCodec` is restartable: feeding partial input never corrupts a later
//! decode. Callers `feed()` newly-read bytes, then call `try_decode()` in a
//! loop until it returns `Ok(None)` ("need more bytes").

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

const CRLF: &[u8] = b"\r\n";

/// A single decoded (or to-be-encoded) protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `*N\r\n` followed by N nested frames.
    Array(Vec<Frame>),
    /// `$L\r\n<L bytes>\r\n`. Binary-safe; never interpreted as UTF-8.
    Bulk(Bytes),
    /// `$-1\r\n`.
    Null,
    /// `+...\r\n`.
    Simple(String),
    /// `-...\r\n`.
    Error(String),
    /// `:...\r\n`.
    Integer(i64),
}

impl Frame {
    /// Convenience constructor for a bulk string from any byte-like input.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    /// Encode this frame into `out`, appending the wire bytes.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Frame::Array(items) => {
                out.push(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(CRLF);
                for item in items {
                    item.encode(out);
                }
            }
            Frame::Bulk(data) => {
                out.push(b'$');
                out.extend_from_slice(data.len().to_string().as_bytes());
                out.extend_from_slice(CRLF);
                out.extend_from_slice(data);
                out.extend_from_slice(CRLF);
            }
            Frame::Null => out.extend_from_slice(b"$-1\r\n"),
            Frame::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(CRLF);
            }
            Frame::Error(s) => {
                out.push(b'-');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(CRLF);
            }
            Frame::Integer(n) => {
                out.push(b':');
                out.extend_from_slice(n.to_string().as_bytes());
                out.extend_from_slice(CRLF);
            }
        }
    }

    /// Encode this frame into a freshly-allocated byte vector.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Incremental decoder holding an internal buffer of not-yet-decoded bytes.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buf: BytesMut,
}

impl FrameCodec {
    /// Creates an empty codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends newly-received bytes to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempts to decode one complete top-level frame from the buffer.
    ///
    /// Returns `Ok(None)` if the buffer does not yet hold a complete frame —
    /// the buffer is left untouched so a later call can retry once more
    /// bytes have been fed in. Returns `Err` on malformed input.
    pub fn try_decode(&mut self) -> Result<Option<Frame>> {
        let mut cursor = 0usize;
        match decode_at(&self.buf, &mut cursor, true)? {
            Some(frame) => {
                let _ = self.buf.split_to(cursor);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

/// Finds the index of the next CRLF at or after `start`, if the buffer holds one.
fn find_crlf(buf: &[u8], start: usize) -> Option<usize> {
    buf[start..]
        .windows(2)
        .position(|w| w == CRLF)
        .map(|i| start + i)
}

/// Reads one line (without the trailing CRLF) starting at `*cursor`, advancing
/// `*cursor` past the CRLF on success. Returns `None` if no CRLF is buffered yet.
fn read_line<'a>(buf: &'a [u8], cursor: &mut usize) -> Option<&'a [u8]> {
    let nl = find_crlf(buf, *cursor)?;
    let line = &buf[*cursor..nl];
    *cursor = nl + CRLF.len();
    Some(line)
}

fn parse_decimal(line: &[u8]) -> Result<i64> {
    let text = std::str::from_utf8(line)
        .map_err(|_| Error::Protocol("non-UTF8 integer".to_string()))?;
    text.parse::<i64>()
        .map_err(|_| Error::Protocol(format!("invalid integer: {text:?}")))
}

/// Decodes one frame starting at `*cursor`. On success (`Some`), `*cursor` is
/// advanced past the frame. On "need more bytes" (`None`), `*cursor` is left
/// in an unspecified state and must not be trusted by the caller.
/// Decodes the frame at `*cursor`. Only the top level of a request (never
/// an element nested inside an array) may fall back to inline-command
/// parsing for an unrecognized first byte; nested elements must use one of
/// the five typed prefixes or the frame is malformed.
fn decode_at(buf: &[u8], cursor: &mut usize, top_level: bool) -> Result<Option<Frame>> {
    if *cursor >= buf.len() {
        return Ok(None);
    }
    match buf[*cursor] {
        b'*' => decode_array(buf, cursor),
        b'$' => decode_bulk(buf, cursor),
        b'+' => decode_simple(buf, cursor),
        b'-' => decode_error(buf, cursor),
        b':' => decode_integer(buf, cursor),
        _ if top_level => decode_inline(buf, cursor),
        other => Err(Error::Protocol(format!("unknown prefix byte: {other:#04x}"))),
    }
}

fn decode_array(buf: &[u8], cursor: &mut usize) -> Result<Option<Frame>> {
    let start = *cursor;
    let mut c = start + 1;
    let Some(line) = read_line(buf, &mut c) else {
        return Ok(None);
    };
    let count = parse_decimal(line)?;
    if count < 0 {
        return Err(Error::Protocol("negative array count".to_string()));
    }
    let count = count as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        match decode_at(buf, &mut c, false)? {
            Some(frame) => items.push(frame),
            None => return Ok(None),
        }
    }
    *cursor = c;
    Ok(Some(Frame::Array(items)))
}

fn decode_bulk(buf: &[u8], cursor: &mut usize) -> Result<Option<Frame>> {
    let start = *cursor;
    let mut c = start + 1;
    let Some(line) = read_line(buf, &mut c) else {
        return Ok(None);
    };
    let len = parse_decimal(line)?;
    if len == -1 {
        *cursor = c;
        return Ok(Some(Frame::Null));
    }
    if len < 0 {
        return Err(Error::Protocol("invalid bulk length".to_string()));
    }
    let len = len as usize;
    if buf.len() < c + len + CRLF.len() {
        return Ok(None);
    }
    if &buf[c + len..c + len + CRLF.len()] != CRLF {
        return Err(Error::Protocol("bulk string missing terminator".to_string()));
    }
    let data = Bytes::copy_from_slice(&buf[c..c + len]);
    *cursor = c + len + CRLF.len();
    Ok(Some(Frame::Bulk(data)))
}

fn decode_simple(buf: &[u8], cursor: &mut usize) -> Result<Option<Frame>> {
    let mut c = *cursor + 1;
    let Some(line) = read_line(buf, &mut c) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(line)
        .map_err(|_| Error::Protocol("non-UTF8 simple string".to_string()))?
        .to_string();
    *cursor = c;
    Ok(Some(Frame::Simple(text)))
}

fn decode_error(buf: &[u8], cursor: &mut usize) -> Result<Option<Frame>> {
    let mut c = *cursor + 1;
    let Some(line) = read_line(buf, &mut c) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(line)
        .map_err(|_| Error::Protocol("non-UTF8 error string".to_string()))?
        .to_string();
    *cursor = c;
    Ok(Some(Frame::Error(text)))
}

fn decode_integer(buf: &[u8], cursor: &mut usize) -> Result<Option<Frame>> {
    let mut c = *cursor + 1;
    let Some(line) = read_line(buf, &mut c) else {
        return Ok(None);
    };
    let value = parse_decimal(line)?;
    *cursor = c;
    Ok(Some(Frame::Integer(value)))
}

/// Decodes an inline command: a whitespace-delimited line with no typed prefix.
fn decode_inline(buf: &[u8], cursor: &mut usize) -> Result<Option<Frame>> {
    let mut c = *cursor;
    let Some(line) = read_line(buf, &mut c) else {
        return Ok(None);
    };
    let args = line
        .split(|b: &u8| b.is_ascii_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| Frame::Bulk(Bytes::copy_from_slice(part)))
        .collect();
    *cursor = c;
    Ok(Some(Frame::Array(args)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Frame {
        let mut codec = FrameCodec::new();
        codec.feed(input);
        codec
            .try_decode()
            .expect("decode should succeed")
            .expect("a full frame should be present")
    }

    #[test]
    fn decodes_simple_string() {
        assert_eq!(decode_all(b"+PONG\r\n"), Frame::Simple("PONG".to_string()));
    }

    #[test]
    fn decodes_error() {
        assert_eq!(
            decode_all(b"-ERR bad\r\n"),
            Frame::Error("ERR bad".to_string())
        );
    }

    #[test]
    fn decodes_integer() {
        assert_eq!(decode_all(b":-42\r\n"), Frame::Integer(-42));
    }

    #[test]
    fn decodes_bulk_string_with_binary_payload() {
        let input = b"$4\r\n\x00\x01\xff\xfe\r\n";
        assert_eq!(
            decode_all(input),
            Frame::Bulk(Bytes::from_static(&[0x00, 0x01, 0xff, 0xfe]))
        );
    }

    #[test]
    fn decodes_null_bulk_string() {
        assert_eq!(decode_all(b"$-1\r\n"), Frame::Null);
    }

    #[test]
    fn decodes_array_of_bulk_strings() {
        let input = b"*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n";
        assert_eq!(
            decode_all(input),
            Frame::Array(vec![
                Frame::Bulk(Bytes::from_static(b"ECHO")),
                Frame::Bulk(Bytes::from_static(b"hey")),
            ])
        );
    }

    #[test]
    fn decodes_inline_command() {
        let input = b"PING\r\n";
        assert_eq!(
            decode_all(input),
            Frame::Array(vec![Frame::Bulk(Bytes::from_static(b"PING"))])
        );
    }

    #[test]
    fn partial_input_returns_none_without_corrupting_buffer() {
        let mut codec = FrameCodec::new();
        codec.feed(b"*1\r\n$4\r\nPI");
        assert_eq!(codec.try_decode().unwrap(), None);
        codec.feed(b"NG\r\n");
        let frame = codec.try_decode().unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![Frame::Bulk(Bytes::from_static(b"PING"))])
        );
    }

    #[test]
    fn rejects_non_decimal_bulk_length() {
        let mut codec = FrameCodec::new();
        codec.feed(b"$abc\r\n");
        assert!(codec.try_decode().is_err());
    }

    #[test]
    fn rejects_negative_array_count_other_than_minus_one() {
        let mut codec = FrameCodec::new();
        codec.feed(b"*-2\r\n");
        assert!(codec.try_decode().is_err());
    }

    #[test]
    fn rejects_unknown_prefix_inside_array() {
        // Inline decoding only triggers at the top level; inside an array every
        // element must use one of the five typed prefixes.
        let mut codec = FrameCodec::new();
        codec.feed(b"*1\r\n#bad\r\n");
        assert!(codec.try_decode().is_err());
    }

    #[test]
    fn encode_then_decode_roundtrips_representable_frames() {
        let frames = vec![
            Frame::Simple("OK".to_string()),
            Frame::Error("ERR oops".to_string()),
            Frame::Integer(12345),
            Frame::Integer(-1),
            Frame::Bulk(Bytes::from_static(b"hello world")),
            Frame::Null,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from_static(b"SET")),
                Frame::Bulk(Bytes::from_static(b"foo")),
                Frame::Bulk(Bytes::from_static(b"bar")),
            ]),
        ];
        for frame in frames {
            let encoded = frame.to_bytes();
            let mut codec = FrameCodec::new();
            codec.feed(&encoded);
            let decoded = codec.try_decode().unwrap().unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn streaming_byte_by_byte_eventually_decodes() {
        let input = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
        let mut codec = FrameCodec::new();
        let mut result = None;
        for &byte in input {
            codec.feed(&[byte]);
            if let Some(frame) = codec.try_decode().unwrap() {
                result = Some(frame);
                break;
            }
        }
        assert_eq!(
            result.unwrap(),
            Frame::Array(vec![
                Frame::Bulk(Bytes::from_static(b"SET")),
                Frame::Bulk(Bytes::from_static(b"foo")),
                Frame::Bulk(Bytes::from_static(b"bar")),
            ])
        );
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn bulk_strings_roundtrip_any_bytes(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let frame = Frame::Bulk(Bytes::from(data));
            let encoded = frame.to_bytes();
            let mut codec = FrameCodec::new();
            codec.feed(&encoded);
            let decoded = codec.try_decode().unwrap().unwrap();
            prop_assert_eq!(decoded, frame);
        }

        #[test]
        fn integers_roundtrip(n in any::<i64>()) {
            let frame = Frame::Integer(n);
            let encoded = frame.to_bytes();
            let mut codec = FrameCodec::new();
            codec.feed(&encoded);
            let decoded = codec.try_decode().unwrap().unwrap();
            prop_assert_eq!(decoded, frame);
        }
    }
}
