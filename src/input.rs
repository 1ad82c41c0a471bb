//! Reading replies off the link to a master.
//!
//! The handshake is line oriented, the snapshot is a length-prefixed blob
//! without a trailing CRLF, and both share one buffer with the command stream
//! that follows, so nothing read ahead is ever lost.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::AsyncReadExt;

use crate::resp::RespError;

/// Errors that end a replication link.
#[derive(Error, Debug, PartialEq)]
pub enum CommandReadError {
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("RESP parse error: {0}")]
    RespParseError(#[from] RespError),
    #[error("invalid response from master: {0}")]
    InvalidResponseFromMaster(String),
    #[error("timed out")]
    Timeout,
}

impl From<std::io::Error> for CommandReadError {
    fn from(e: std::io::Error) -> Self {
        CommandReadError::IoError(e.to_string())
    }
}

async fn fill<R>(reader: &mut R, buffer: &mut BytesMut) -> Result<(), CommandReadError>
where
    R: AsyncReadExt + Unpin,
{
    if reader.read_buf(buffer).await? == 0 {
        return Err(CommandReadError::ConnectionClosed);
    }

    Ok(())
}

/// Reads one CRLF terminated line, without the terminator.
///
/// Bare newlines in front of the line are keep-alives; `keepalive` is called
/// once for each.
pub async fn read_line<R, F>(
    reader: &mut R,
    buffer: &mut BytesMut,
    mut keepalive: F,
) -> Result<String, CommandReadError>
where
    R: AsyncReadExt + Unpin,
    F: FnMut(),
{
    loop {
        while buffer.first() == Some(&b'\n') {
            buffer.advance(1);
            keepalive();
        }

        if let Some(end) = buffer.windows(2).position(|window| window == b"\r\n") {
            let line = buffer.split_to(end + 2);
            return std::str::from_utf8(&line[..end])
                .map(str::to_string)
                .map_err(|_| CommandReadError::InvalidUtf8);
        }

        fill(reader, buffer).await?;
    }
}

/// Reads exactly `len` bytes.
pub async fn read_payload<R>(
    reader: &mut R,
    buffer: &mut BytesMut,
    len: usize,
) -> Result<Bytes, CommandReadError>
where
    R: AsyncReadExt + Unpin,
{
    while buffer.len() < len {
        buffer.reserve(len - buffer.len());
        fill(reader, buffer).await?;
    }

    Ok(buffer.split_to(len).freeze())
}

/// Parses the `$<len>` header that precedes a snapshot transfer.
pub fn parse_bulk_header(line: &str) -> Result<usize, CommandReadError> {
    line.strip_prefix('$')
        .and_then(|len| len.parse::<usize>().ok())
        .ok_or_else(|| CommandReadError::InvalidResponseFromMaster(line.to_string()))
}
