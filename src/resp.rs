//! Redis Serialization Protocol (RESP) encoding and decoding.
//!
//! Decoding works on a byte buffer that may hold a partial frame. A frame is
//! only consumed once it is complete, and the decoder reports how many bytes
//! it covered so the replication offset can advance by exactly that amount.

use bytes::{Buf, BytesMut};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RespError {
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unknown RESP type")]
    UnknownRespType,
    #[error("failed to parse integer")]
    FailedToParseInteger,
    #[error("invalid bulk string")]
    InvalidBulkString,
    #[error("invalid multibulk length")]
    InvalidArray,
}

impl RespError {
    pub fn as_string(&self) -> String {
        RespValue::Error(format!("ERR Protocol error: {}", self)).encode()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(String),
    Array(Vec<RespValue>),
    Null,
}

/// A complete unit read off the wire.
#[derive(Debug, PartialEq)]
pub enum Frame {
    Value(RespValue),
    /// A bare newline. Masters send these to replicas that are waiting for a snapshot.
    KeepAlive,
}

impl RespValue {
    pub fn encode(&self) -> String {
        match self {
            RespValue::SimpleString(s) => format!("+{}\r\n", s),
            RespValue::Error(msg) => format!("-{}\r\n", msg),
            RespValue::Integer(i) => format!(":{}\r\n", i),
            RespValue::BulkString(s) => format!("${}\r\n{}\r\n", s.len(), s),
            RespValue::Array(elements) => {
                let mut encoded = format!("*{}\r\n", elements.len());

                for element in elements {
                    encoded.push_str(&element.encode());
                }

                encoded
            }
            RespValue::Null => "$-1\r\n".to_string(),
        }
    }

    /// Builds the multi-bulk form of a command, as clients and masters send it.
    pub fn command<S: AsRef<str>>(arguments: &[S]) -> Self {
        RespValue::Array(
            arguments
                .iter()
                .map(|arg| RespValue::BulkString(arg.as_ref().to_string()))
                .collect(),
        )
    }

    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Flattens a multi-bulk command into its argument strings.
    pub fn into_arguments(self) -> Option<Vec<String>> {
        let RespValue::Array(elements) = self else {
            return None;
        };

        elements
            .into_iter()
            .map(|element| match element {
                RespValue::BulkString(s) | RespValue::SimpleString(s) => Some(s),
                RespValue::Integer(i) => Some(i.to_string()),
                _ => None,
            })
            .collect()
    }
}

/// Decodes the next frame from `buffer` without consuming it.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the frame and the
/// number of bytes it spans. Lines that do not start with a RESP type marker
/// are treated as inline commands.
pub fn parse_frame(buffer: &[u8]) -> Result<Option<(Frame, usize)>, RespError> {
    let Some(&first) = buffer.first() else {
        return Ok(None);
    };

    match first {
        b'*' | b'$' | b'+' | b'-' | b':' => {
            Ok(decode_value(buffer, 0)?.map(|(value, len)| (Frame::Value(value), len)))
        }
        _ => parse_inline(buffer),
    }
}

/// Splits every complete frame off the front of `buffer`.
pub fn take_frames(buffer: &mut BytesMut) -> Result<Vec<(Frame, usize)>, RespError> {
    let mut frames = Vec::new();

    while let Some((frame, len)) = parse_frame(buffer)? {
        buffer.advance(len);
        frames.push((frame, len));
    }

    Ok(frames)
}

fn parse_inline(buffer: &[u8]) -> Result<Option<(Frame, usize)>, RespError> {
    let Some(newline) = buffer.iter().position(|b| *b == b'\n') else {
        return Ok(None);
    };

    let line = std::str::from_utf8(&buffer[..newline]).map_err(|_| RespError::InvalidUtf8)?;
    let arguments: Vec<&str> = line.trim_end_matches('\r').split_whitespace().collect();

    if arguments.is_empty() {
        return Ok(Some((Frame::KeepAlive, newline + 1)));
    }

    Ok(Some((
        Frame::Value(RespValue::command(&arguments)),
        newline + 1,
    )))
}

fn read_line(buffer: &[u8], cursor: usize) -> Result<Option<(&str, usize)>, RespError> {
    let Some(position) = buffer[cursor..].windows(2).position(|w| w == b"\r\n") else {
        return Ok(None);
    };

    let line = std::str::from_utf8(&buffer[cursor..cursor + position])
        .map_err(|_| RespError::InvalidUtf8)?;

    Ok(Some((line, cursor + position + 2)))
}

fn decode_value(buffer: &[u8], cursor: usize) -> Result<Option<(RespValue, usize)>, RespError> {
    if cursor >= buffer.len() {
        return Ok(None);
    }

    let marker = buffer[cursor];
    let Some((line, next)) = read_line(buffer, cursor + 1)? else {
        return Ok(None);
    };

    match marker {
        b'+' => Ok(Some((RespValue::SimpleString(line.to_string()), next))),
        b'-' => Ok(Some((RespValue::Error(line.to_string()), next))),
        b':' => {
            let value = line
                .parse::<i64>()
                .map_err(|_| RespError::FailedToParseInteger)?;

            Ok(Some((RespValue::Integer(value), next)))
        }
        b'$' => {
            let length = line
                .parse::<i64>()
                .map_err(|_| RespError::InvalidBulkString)?;

            if length < 0 {
                return Ok(Some((RespValue::Null, next)));
            }

            let end = next + length as usize;

            if buffer.len() < end + 2 {
                return Ok(None);
            }

            if &buffer[end..end + 2] != b"\r\n" {
                return Err(RespError::InvalidBulkString);
            }

            let content =
                std::str::from_utf8(&buffer[next..end]).map_err(|_| RespError::InvalidUtf8)?;

            Ok(Some((RespValue::BulkString(content.to_string()), end + 2)))
        }
        b'*' => {
            let length = line.parse::<i64>().map_err(|_| RespError::InvalidArray)?;

            if length < 0 {
                return Ok(Some((RespValue::Null, next)));
            }

            let mut elements = Vec::with_capacity(length as usize);
            let mut cursor = next;

            for _ in 0..length {
                match decode_value(buffer, cursor)? {
                    Some((element, after)) => {
                        elements.push(element);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }

            Ok(Some((RespValue::Array(elements), cursor)))
        }
        _ => Err(RespError::UnknownRespType),
    }
}
