//! On-disk snapshot format, a subset of the RDB layout.

mod encoding;
mod get_slice;
mod opcode;
mod rdb_file_operations;
mod rdb_parser;
mod rdb_writer;
mod snapshot_error;

pub use rdb_file_operations::{load_snapshot_file, write_snapshot, SnapshotProgress};
pub use rdb_parser::{snapshot_to_commands, RdbParser};
pub use rdb_writer::RdbWriter;
pub use snapshot_error::SnapshotError;
