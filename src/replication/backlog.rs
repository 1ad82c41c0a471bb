use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum BacklogError {
    #[error("offset {0} has not been written yet")]
    OutOfRange(i64),
    #[error("offset {0} has been overwritten")]
    DataLoss(i64),
}

#[derive(Debug)]
struct Ring {
    buffer: Vec<u8>,
    write_offset: i64,
    start_offset: i64,
    valid_len: usize,
    active: bool,
}

/// Fixed-size ring of the most recent replication stream bytes.
///
/// Positions are absolute stream offsets: `write_offset` only ever grows, and
/// the ring keeps the last `valid_len` bytes before it.
#[derive(Debug)]
pub struct Backlog {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl Backlog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            capacity,
            ring: Mutex::new(Ring {
                buffer: vec![0; capacity],
                write_offset: 0,
                start_offset: 0,
                valid_len: 0,
                active: false,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `data` to the stream. Nothing is recorded while inactive.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut ring = self.ring.lock();

        if !ring.active {
            return 0;
        }

        let mut data = data;

        if data.len() > self.capacity {
            let skipped = data.len() - self.capacity;
            ring.write_offset += skipped as i64;
            data = &data[skipped..];
        }

        let position = ring.write_offset as usize % self.capacity;
        let first = data.len().min(self.capacity - position);

        ring.buffer[position..position + first].copy_from_slice(&data[..first]);
        ring.buffer[..data.len() - first].copy_from_slice(&data[first..]);

        ring.write_offset += data.len() as i64;
        ring.valid_len = (ring.valid_len + data.len()).min(self.capacity);

        data.len()
    }

    /// Checks whether every byte from `offset` up to the write offset is still held.
    pub fn readable(&self, offset: i64) -> Result<(), BacklogError> {
        let ring = self.ring.lock();
        Self::check(&ring, offset)
    }

    /// Returns the bytes from `offset` up to the current write offset.
    pub fn read(&self, offset: i64) -> Result<Bytes, BacklogError> {
        let ring = self.ring.lock();
        Self::check(&ring, offset)?;

        let length = (ring.write_offset - offset) as usize;
        let position = offset as usize % self.capacity;
        let first = length.min(self.capacity - position);

        let mut out = Vec::with_capacity(length);
        out.extend_from_slice(&ring.buffer[position..position + first]);
        out.extend_from_slice(&ring.buffer[..length - first]);

        Ok(Bytes::from(out))
    }

    /// Restarts the stream at `offset` with nothing recorded.
    pub fn reset(&self, offset: i64) {
        let mut ring = self.ring.lock();
        ring.write_offset = offset;
        ring.start_offset = offset;
        ring.valid_len = 0;
    }

    pub fn activate(&self) {
        self.ring.lock().active = true;
    }

    pub fn deactivate(&self) {
        self.ring.lock().active = false;
    }

    pub fn is_active(&self) -> bool {
        self.ring.lock().active
    }

    pub fn write_offset(&self) -> i64 {
        self.ring.lock().write_offset
    }

    pub fn start_offset(&self) -> i64 {
        self.ring.lock().start_offset
    }

    pub fn valid_len(&self) -> usize {
        self.ring.lock().valid_len
    }

    /// Oldest offset that can still be read.
    pub fn first_offset(&self) -> i64 {
        let ring = self.ring.lock();
        ring.write_offset - ring.valid_len as i64
    }

    fn check(ring: &Ring, offset: i64) -> Result<(), BacklogError> {
        if offset > ring.write_offset {
            return Err(BacklogError::OutOfRange(offset));
        }

        if offset < 0 || ring.write_offset - offset > ring.valid_len as i64 {
            return Err(BacklogError::DataLoss(offset));
        }

        Ok(())
    }
}
