use bytes::{BufMut, Bytes, BytesMut};
use jiff::Timestamp;

use crate::{
    key_value_store::Value,
    rdb::{
        encoding::{write_length, write_string},
        opcode::{
            DATABASE_OPCODE, END_OF_FILE_OPCODE, EXPIRATION_MILLISECONDS_OPCODE, LIST_VALUE_TYPE,
            MAGIC_STRING, METADATA_OPCODE, RDB_VERSION, RESIZE_DB_OPCODE, STRING_VALUE_TYPE,
        },
    },
};

/// Streaming snapshot encoder.
///
/// Output accumulates in an internal buffer that callers drain with
/// [`RdbWriter::take`] whenever they want to flush a chunk somewhere.
pub struct RdbWriter {
    buffer: BytesMut,
}

impl Default for RdbWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RdbWriter {
    /// Starts a snapshot with the header and the auxiliary fields.
    pub fn new() -> Self {
        let mut buffer = BytesMut::with_capacity(4096);
        buffer.put_slice(MAGIC_STRING.as_bytes());
        buffer.put_slice(RDB_VERSION.as_bytes());

        let mut writer = Self { buffer };
        writer.write_metadata("redis-ver", "7.0.0");
        writer.write_metadata("redis-bits", "64");
        writer.write_metadata("ctime", &Timestamp::now().as_second().to_string());

        writer
    }

    fn write_metadata(&mut self, key: &str, value: &str) {
        self.buffer.put_u8(METADATA_OPCODE);
        write_string(&mut self.buffer, key);
        write_string(&mut self.buffer, value);
    }

    pub fn begin_partition(&mut self, index: usize, key_count: usize, ttl_count: usize) {
        self.buffer.put_u8(DATABASE_OPCODE);
        write_length(&mut self.buffer, index);
        self.buffer.put_u8(RESIZE_DB_OPCODE);
        write_length(&mut self.buffer, key_count);
        write_length(&mut self.buffer, ttl_count);
    }

    pub fn write_entry(&mut self, key: &str, value: &Value, expires_at: Option<i64>) {
        if let Some(at) = expires_at {
            self.buffer.put_u8(EXPIRATION_MILLISECONDS_OPCODE);
            self.buffer.put_u64_le(at.max(0) as u64);
        }

        match value {
            Value::String(s) => {
                self.buffer.put_u8(STRING_VALUE_TYPE);
                write_string(&mut self.buffer, key);
                write_string(&mut self.buffer, s);
            }
            Value::List(items) => {
                self.buffer.put_u8(LIST_VALUE_TYPE);
                write_string(&mut self.buffer, key);
                write_length(&mut self.buffer, items.len());

                for item in items {
                    write_string(&mut self.buffer, item);
                }
            }
        }
    }

    /// Writes the end marker. The checksum is left as zero, meaning "not computed".
    pub fn end(&mut self) {
        self.buffer.put_u8(END_OF_FILE_OPCODE);
        self.buffer.put_u64(0);
    }

    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }
}
