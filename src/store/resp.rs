//! RESP2 Frames and Codec
//!
//! Client-side implementation of the REdis Serialization Protocol: commands
//! are encoded as arrays of bulk strings, replies are decoded into
//! [`RespFrame`]s. The codec plugs into `tokio_util::codec::Framed`.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Protocol-level limits for replies.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;
const MAX_RECURSION_DEPTH: usize = 64;

/// Errors produced while encoding or decoding RESP frames
#[derive(Error, Debug)]
pub enum RespError {
    /// Underlying socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent bytes that are not valid RESP
    #[error("Malformed reply: {0}")]
    Syntax(String),
}

/// A single RESP2 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Build a command frame (`*N` array of bulk strings)
    pub fn command<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self::Array(
            parts
                .into_iter()
                .map(|part| Self::BulkString(Bytes::copy_from_slice(part.as_ref())))
                .collect(),
        )
    }

    /// Short name of the frame kind, for error messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SimpleString(_) => "simple string",
            Self::Error(_) => "error",
            Self::Integer(_) => "integer",
            Self::BulkString(_) => "bulk string",
            Self::Null => "null",
            Self::NullArray => "null array",
            Self::Array(_) => "array",
        }
    }
}

/// `tokio_util` codec for [`RespFrame`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct RespCodec;

impl Encoder<RespFrame> for RespCodec {
    type Error = RespError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(b) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(b.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
            RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
            RespFrame::Array(frames) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(frames.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for frame in frames {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

/// Outcome of a partial parse: either a frame or a request for more bytes.
enum Parse<T> {
    Done(T),
    Incomplete,
}

impl Decoder for RespCodec {
    type Item = RespFrame;
    type Error = RespError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = &src[..];
        match parse_frame(&mut cursor, 0)? {
            Parse::Done(frame) => {
                let consumed = src.len() - cursor.len();
                src.advance(consumed);
                Ok(Some(frame))
            }
            Parse::Incomplete => Ok(None),
        }
    }
}

/// Parse one frame, advancing `bytes` past it on success.
fn parse_frame(bytes: &mut &[u8], depth: usize) -> Result<Parse<RespFrame>, RespError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(RespError::Syntax("nesting depth limit exceeded".to_string()));
    }
    let input: &[u8] = *bytes;
    let Some(&prefix) = input.first() else {
        return Ok(Parse::Incomplete);
    };

    let Parse::Done(line) = take_line(&input[1..]) else {
        return Ok(Parse::Incomplete);
    };
    // Prefix byte + line + CRLF
    let header_len = 1 + line.len() + CRLF_LEN;
    let text = String::from_utf8_lossy(line).into_owned();

    let frame = match prefix {
        b'+' => {
            *bytes = &input[header_len..];
            RespFrame::SimpleString(text)
        }
        b'-' => {
            *bytes = &input[header_len..];
            RespFrame::Error(text)
        }
        b':' => {
            let value = parse_length::<i64>(&text)?;
            *bytes = &input[header_len..];
            RespFrame::Integer(value)
        }
        b'$' => {
            let len = parse_length::<i64>(&text)?;
            if len == -1 {
                *bytes = &input[header_len..];
                return Ok(Parse::Done(RespFrame::Null));
            }
            let len = usize::try_from(len)
                .map_err(|_| RespError::Syntax(format!("invalid bulk length {len}")))?;
            if len > MAX_BULK_STRING_SIZE {
                return Err(RespError::Syntax(format!("bulk string of {len} bytes too large")));
            }
            let body = &input[header_len..];
            if body.len() < len + CRLF_LEN {
                return Ok(Parse::Incomplete);
            }
            if &body[len..len + CRLF_LEN] != CRLF {
                return Err(RespError::Syntax("bulk string not terminated by CRLF".to_string()));
            }
            let data = Bytes::copy_from_slice(&body[..len]);
            *bytes = &body[len + CRLF_LEN..];
            RespFrame::BulkString(data)
        }
        b'*' => {
            let count = parse_length::<i64>(&text)?;
            if count == -1 {
                *bytes = &input[header_len..];
                return Ok(Parse::Done(RespFrame::NullArray));
            }
            let count = usize::try_from(count)
                .map_err(|_| RespError::Syntax(format!("invalid array length {count}")))?;
            if count > MAX_FRAME_ELEMENTS {
                return Err(RespError::Syntax(format!("array of {count} elements too large")));
            }
            let mut rest = &input[header_len..];
            let mut frames = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                match parse_frame(&mut rest, depth + 1)? {
                    Parse::Done(frame) => frames.push(frame),
                    Parse::Incomplete => return Ok(Parse::Incomplete),
                }
            }
            *bytes = rest;
            RespFrame::Array(frames)
        }
        other => {
            return Err(RespError::Syntax(format!("unexpected type byte 0x{other:02x}")));
        }
    };

    Ok(Parse::Done(frame))
}

/// Return the bytes before the next CRLF.
fn take_line(bytes: &[u8]) -> Parse<&[u8]> {
    match bytes.windows(CRLF_LEN).position(|window| window == CRLF) {
        Some(pos) => Parse::Done(&bytes[..pos]),
        None => Parse::Incomplete,
    }
}

fn parse_length<T: std::str::FromStr>(text: &str) -> Result<T, RespError> {
    text.parse::<T>().map_err(|_| RespError::Syntax(format!("invalid number '{text}'")))
}
