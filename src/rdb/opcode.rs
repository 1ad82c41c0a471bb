use std::collections::VecDeque;

use crate::{
    key_value_store::Value,
    rdb::{
        encoding::{parse_length, parse_string},
        get_slice::{get_array, get_buffer_slice},
        snapshot_error::SnapshotError,
    },
};

pub const MAGIC_STRING: &str = "REDIS";
pub const RDB_VERSION: &str = "0009";

pub const METADATA_OPCODE: u8 = 0xFA;
pub const RESIZE_DB_OPCODE: u8 = 0xFB;
pub const DATABASE_OPCODE: u8 = 0xFE;
pub const EXPIRATION_SECONDS_OPCODE: u8 = 0xFD;
pub const EXPIRATION_MILLISECONDS_OPCODE: u8 = 0xFC;
pub const END_OF_FILE_OPCODE: u8 = 0xFF;
pub const STRING_VALUE_TYPE: u8 = 0x00;
pub const LIST_VALUE_TYPE: u8 = 0x01;

#[derive(Debug, PartialEq)]
pub enum OpCodeResponse {
    Metadata {
        key: String,
        value: String,
    },
    ResizeDb {
        key_count: usize,
        ttl_count: usize,
    },
    Database {
        index: usize,
    },
    Entry {
        key: String,
        value: Value,
        expires_at: Option<i64>,
    },
    EndOfFile {
        checksum: [u8; 8],
    },
}

pub fn parse_opcode(bytes: &[u8], cursor: usize) -> Result<(OpCodeResponse, usize), SnapshotError> {
    let opcode = get_buffer_slice(bytes, cursor, 1)?[0];
    let mut temp_cursor = cursor + 1;

    let response = match opcode {
        METADATA_OPCODE => {
            let (key, read) = parse_string(bytes, temp_cursor)?;
            temp_cursor += read;
            let (value, read) = parse_string(bytes, temp_cursor)?;
            temp_cursor += read;

            OpCodeResponse::Metadata { key, value }
        }
        RESIZE_DB_OPCODE => {
            let (key_count, read) = parse_length(bytes, temp_cursor)?;
            temp_cursor += read;
            let (ttl_count, read) = parse_length(bytes, temp_cursor)?;
            temp_cursor += read;

            OpCodeResponse::ResizeDb {
                key_count,
                ttl_count,
            }
        }
        DATABASE_OPCODE => {
            let (index, read) = parse_length(bytes, temp_cursor)?;
            temp_cursor += read;

            OpCodeResponse::Database { index }
        }
        EXPIRATION_SECONDS_OPCODE => {
            let seconds = u32::from_le_bytes(get_array::<4>(bytes, temp_cursor)?);
            temp_cursor += 4;

            let (key, value, read) = parse_entry(bytes, temp_cursor)?;
            temp_cursor += read;

            OpCodeResponse::Entry {
                key,
                value,
                expires_at: Some(i64::from(seconds) * 1000),
            }
        }
        EXPIRATION_MILLISECONDS_OPCODE => {
            let milliseconds = u64::from_le_bytes(get_array::<8>(bytes, temp_cursor)?);
            temp_cursor += 8;

            let expires_at =
                i64::try_from(milliseconds).map_err(|_| SnapshotError::InvalidExpiration)?;

            let (key, value, read) = parse_entry(bytes, temp_cursor)?;
            temp_cursor += read;

            OpCodeResponse::Entry {
                key,
                value,
                expires_at: Some(expires_at),
            }
        }
        END_OF_FILE_OPCODE => {
            let checksum = get_array::<8>(bytes, temp_cursor)?;
            temp_cursor += 8;

            OpCodeResponse::EndOfFile { checksum }
        }
        _ => {
            let (key, value, read) = parse_entry(bytes, cursor)?;
            temp_cursor = cursor + read;

            OpCodeResponse::Entry {
                key,
                value,
                expires_at: None,
            }
        }
    };

    Ok((response, temp_cursor - cursor))
}

/// Reads a value type byte followed by a key and the value itself.
fn parse_entry(bytes: &[u8], cursor: usize) -> Result<(String, Value, usize), SnapshotError> {
    let value_type = get_buffer_slice(bytes, cursor, 1)?[0];
    let mut temp_cursor = cursor + 1;

    let (key, read) = parse_string(bytes, temp_cursor)?;
    temp_cursor += read;

    let value = match value_type {
        STRING_VALUE_TYPE => {
            let (value, read) = parse_string(bytes, temp_cursor)?;
            temp_cursor += read;

            Value::String(value)
        }
        LIST_VALUE_TYPE => {
            let (length, read) = parse_length(bytes, temp_cursor)?;
            temp_cursor += read;

            let mut list = VecDeque::with_capacity(length.min(1024));

            for _ in 0..length {
                let (item, read) = parse_string(bytes, temp_cursor)?;
                temp_cursor += read;
                list.push_back(item);
            }

            Value::List(list)
        }
        other => return Err(SnapshotError::UnknownOpCode(other)),
    };

    Ok((key, value, temp_cursor - cursor))
}

pub struct MagicStringResponse {
    pub number_of_read_bytes: usize,
    pub version: String,
}

pub fn parse_magic_string(bytes: &[u8]) -> Result<MagicStringResponse, SnapshotError> {
    let magic_string = get_buffer_slice(bytes, 0, 5)?;

    if magic_string != MAGIC_STRING.as_bytes() {
        return Err(SnapshotError::InvalidMagicString);
    }

    let version = std::str::from_utf8(get_buffer_slice(bytes, 5, 4)?)
        .map_err(|_| SnapshotError::InvalidUtf8)?
        .to_string();

    match version.parse::<u32>() {
        Ok(number) if (1..=12).contains(&number) => Ok(MagicStringResponse {
            number_of_read_bytes: 9,
            version,
        }),
        _ => Err(SnapshotError::UnsupportedVersion(version)),
    }
}
