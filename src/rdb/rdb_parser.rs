use std::collections::HashMap;

use crate::{
    key_value_store::Value,
    rdb::{
        opcode::{parse_magic_string, parse_opcode, OpCodeResponse},
        snapshot_error::SnapshotError,
    },
};

/// Incremental snapshot decoder.
///
/// Bytes can be fed in arbitrary chunks; anything that does not yet form a
/// complete record is kept until the next call. Decoded entries are turned
/// into the commands that would recreate them (`SELECT`, `SET`, `RPUSH`,
/// `PEXPIREAT`), so a snapshot is loaded through the normal command path.
#[derive(Debug, Default)]
pub struct RdbParser {
    buffer: Vec<u8>,
    cursor: usize,
    pub version: Option<String>,
    pub metadata: HashMap<String, String>,
    pub commands: Vec<Vec<String>>,
    pub checksum: Option<[u8; 8]>,
}

impl RdbParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.checksum.is_some()
    }

    pub fn parse(&mut self, chunk: &[u8]) -> Result<(), SnapshotError> {
        if self.is_finished() {
            return Ok(());
        }

        self.buffer.extend_from_slice(chunk);

        if self.version.is_none() {
            match parse_magic_string(&self.buffer) {
                Ok(response) => {
                    self.cursor += response.number_of_read_bytes;
                    self.version = Some(response.version);
                }
                Err(SnapshotError::UnexpectedEof) => return Ok(()),
                Err(e) => return Err(e),
            }
        }

        while self.cursor < self.buffer.len() && !self.is_finished() {
            let (response, read) = match parse_opcode(&self.buffer, self.cursor) {
                Ok(parsed) => parsed,
                Err(SnapshotError::UnexpectedEof) => break,
                Err(e) => return Err(e),
            };

            self.cursor += read;
            self.apply(response);
        }

        self.buffer.drain(..self.cursor);
        self.cursor = 0;

        Ok(())
    }

    fn apply(&mut self, response: OpCodeResponse) {
        match response {
            OpCodeResponse::Metadata { key, value } => {
                self.metadata.insert(key, value);
            }
            OpCodeResponse::ResizeDb { .. } => {}
            OpCodeResponse::Database { index } => {
                self.commands
                    .push(vec!["SELECT".to_string(), index.to_string()]);
            }
            OpCodeResponse::Entry {
                key,
                value,
                expires_at,
            } => self.push_entry(key, value, expires_at),
            OpCodeResponse::EndOfFile { checksum } => {
                self.checksum = Some(checksum);
            }
        }
    }

    fn push_entry(&mut self, key: String, value: Value, expires_at: Option<i64>) {
        match value {
            Value::String(value) => {
                let mut command = vec!["SET".to_string(), key, value];

                if let Some(at) = expires_at {
                    command.push("PXAT".to_string());
                    command.push(at.to_string());
                }

                self.commands.push(command);
            }
            Value::List(items) => {
                if items.is_empty() {
                    return;
                }

                let mut command = vec!["RPUSH".to_string(), key.clone()];
                command.extend(items);
                self.commands.push(command);

                if let Some(at) = expires_at {
                    self.commands
                        .push(vec!["PEXPIREAT".to_string(), key, at.to_string()]);
                }
            }
        }
    }

    /// Returns the decoded commands, failing if the end marker was never seen.
    pub fn into_commands(self) -> Result<Vec<Vec<String>>, SnapshotError> {
        if !self.is_finished() {
            return Err(SnapshotError::UnexpectedEof);
        }

        Ok(self.commands)
    }
}

/// Decodes a complete snapshot into the commands that recreate it.
pub fn snapshot_to_commands(bytes: &[u8]) -> Result<Vec<Vec<String>>, SnapshotError> {
    let mut parser = RdbParser::new();
    parser.parse(bytes)?;
    parser.into_commands()
}
