use crate::rdb::snapshot_error::SnapshotError;

pub fn get_buffer_slice(buffer: &[u8], cursor: usize, len: usize) -> Result<&[u8], SnapshotError> {
    if cursor + len > buffer.len() {
        return Err(SnapshotError::UnexpectedEof);
    }

    Ok(&buffer[cursor..cursor + len])
}

pub fn get_array<const N: usize>(buffer: &[u8], cursor: usize) -> Result<[u8; N], SnapshotError> {
    get_buffer_slice(buffer, cursor, N)?
        .try_into()
        .map_err(|_| SnapshotError::UnexpectedEof)
}
