use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot is truncated")]
    UnexpectedEof,
    #[error("invalid magic string")]
    InvalidMagicString,
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(String),
    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpCode(u8),
    #[error("invalid length encoding")]
    InvalidLengthEncoding,
    #[error("unsupported value encoding")]
    UnsupportedValueEncoding,
    #[error("invalid UTF-8 in snapshot")]
    InvalidUtf8,
    #[error("invalid expiration timestamp")]
    InvalidExpiration,
}
