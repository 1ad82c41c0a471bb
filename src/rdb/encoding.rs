use bytes::{BufMut, BytesMut};

use crate::rdb::{
    get_slice::{get_array, get_buffer_slice},
    snapshot_error::SnapshotError,
};

#[derive(Debug, PartialEq)]
enum ValueEncoding {
    Length(usize),
    Int8,
    Int16,
    Int32,
    LzfCompressedString,
}

/// Reads a length prefix. The top two bits of the first byte select the form:
/// 00 is a 6 bit length, 01 a 14 bit length, 10 a 32 or 64 bit big-endian
/// length and 11 a special string encoding.
fn parse_length_encoding(bytes: &[u8], cursor: usize) -> Result<(ValueEncoding, usize), SnapshotError> {
    let first = get_buffer_slice(bytes, cursor, 1)?[0];

    match first >> 6 {
        0b00 => Ok((ValueEncoding::Length((first & 0b0011_1111) as usize), 1)),
        0b01 => {
            let second = get_buffer_slice(bytes, cursor + 1, 1)?[0];
            let length = (((first & 0b0011_1111) as usize) << 8) | second as usize;

            Ok((ValueEncoding::Length(length), 2))
        }
        0b10 => match first {
            0x80 => {
                let length = u32::from_be_bytes(get_array::<4>(bytes, cursor + 1)?);
                Ok((ValueEncoding::Length(length as usize), 5))
            }
            0x81 => {
                let length = u64::from_be_bytes(get_array::<8>(bytes, cursor + 1)?);
                Ok((ValueEncoding::Length(length as usize), 9))
            }
            _ => Err(SnapshotError::InvalidLengthEncoding),
        },
        _ => match first & 0b0011_1111 {
            0 => Ok((ValueEncoding::Int8, 1)),
            1 => Ok((ValueEncoding::Int16, 1)),
            2 => Ok((ValueEncoding::Int32, 1)),
            3 => Ok((ValueEncoding::LzfCompressedString, 1)),
            _ => Err(SnapshotError::InvalidLengthEncoding),
        },
    }
}

/// Reads a plain length, as used for database numbers, table sizes and list lengths.
pub fn parse_length(bytes: &[u8], cursor: usize) -> Result<(usize, usize), SnapshotError> {
    match parse_length_encoding(bytes, cursor)? {
        (ValueEncoding::Length(length), read) => Ok((length, read)),
        _ => Err(SnapshotError::InvalidLengthEncoding),
    }
}

/// Reads a string, including the integer encoded forms.
pub fn parse_string(bytes: &[u8], cursor: usize) -> Result<(String, usize), SnapshotError> {
    let (encoding, read) = parse_length_encoding(bytes, cursor)?;
    let start = cursor + read;

    match encoding {
        ValueEncoding::Length(length) => {
            let slice = get_buffer_slice(bytes, start, length)?;
            let string = std::str::from_utf8(slice).map_err(|_| SnapshotError::InvalidUtf8)?;

            Ok((string.to_string(), read + length))
        }
        ValueEncoding::Int8 => {
            let value = i8::from_le_bytes(get_array::<1>(bytes, start)?);
            Ok((value.to_string(), read + 1))
        }
        ValueEncoding::Int16 => {
            let value = i16::from_le_bytes(get_array::<2>(bytes, start)?);
            Ok((value.to_string(), read + 2))
        }
        ValueEncoding::Int32 => {
            let value = i32::from_le_bytes(get_array::<4>(bytes, start)?);
            Ok((value.to_string(), read + 4))
        }
        ValueEncoding::LzfCompressedString => Err(SnapshotError::UnsupportedValueEncoding),
    }
}

pub fn write_length(buffer: &mut BytesMut, length: usize) {
    if length < 1 << 6 {
        buffer.put_u8(length as u8);
    } else if length < 1 << 14 {
        buffer.put_u8(0b0100_0000 | (length >> 8) as u8);
        buffer.put_u8(length as u8);
    } else if length <= u32::MAX as usize {
        buffer.put_u8(0x80);
        buffer.put_u32(length as u32);
    } else {
        buffer.put_u8(0x81);
        buffer.put_u64(length as u64);
    }
}

pub fn write_string(buffer: &mut BytesMut, value: &str) {
    write_length(buffer, value.len());
    buffer.put_slice(value.as_bytes());
}
