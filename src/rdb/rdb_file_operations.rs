use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::{
    key_value_store::{now_ms, Keyspace, Value},
    rdb::{rdb_parser::snapshot_to_commands, snapshot_error::SnapshotError, RdbWriter},
};

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Per-partition outcome reported while a snapshot is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotProgress {
    PartitionWritten(usize),
    PartitionAborted(usize),
}

fn temp_file_path(path: &Path) -> PathBuf {
    let counter = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!("temp-{}-{}.rdb", std::process::id(), counter))
}

/// Serializes `views` (one per partition, in order) to `path`.
///
/// The file is written under a temporary name and renamed into place once
/// complete. `progress` is told about every partition: written once its
/// bytes are on their way to disk and the view has been released, aborted
/// for the partition that hit an I/O error and every partition after it.
/// Expired keys are left out. On success the full snapshot is returned so
/// it can be shipped to replicas without reading the file back.
pub fn write_snapshot<F>(
    path: &Path,
    views: Vec<Arc<Keyspace<Value>>>,
    mut progress: F,
) -> Result<Bytes, SnapshotError>
where
    F: FnMut(SnapshotProgress),
{
    let total = views.len();
    let temp_path = temp_file_path(path);
    let now = now_ms();

    let abort_from = |index: usize, progress: &mut F| {
        for i in index..total {
            progress(SnapshotProgress::PartitionAborted(i));
        }
    };

    let mut file = match File::create(&temp_path) {
        Ok(file) => BufWriter::new(file),
        Err(e) => {
            abort_from(0, &mut progress);
            return Err(e.into());
        }
    };

    let mut writer = RdbWriter::new();
    let mut payload = BytesMut::new();

    let header = writer.take();
    if let Err(e) = file.write_all(&header) {
        abort_from(0, &mut progress);
        discard(&temp_path);
        return Err(e.into());
    }
    payload.extend_from_slice(&header);

    for (index, view) in views.into_iter().enumerate() {
        if !view.is_empty() {
            writer.begin_partition(index, view.len(), view.ttl_count());

            for (key, value) in view.data.iter() {
                let expires_at = view.expiry(key);

                if expires_at.is_some_and(|at| at <= now) {
                    continue;
                }

                writer.write_entry(key, value, expires_at);
            }
        }

        drop(view);

        let chunk = writer.take();
        if let Err(e) = file.write_all(&chunk) {
            warn!("Snapshot of partition {} failed: {}", index, e);
            abort_from(index, &mut progress);
            discard(&temp_path);
            return Err(e.into());
        }
        payload.extend_from_slice(&chunk);

        progress(SnapshotProgress::PartitionWritten(index));
    }

    writer.end();
    let trailer = writer.take();
    payload.extend_from_slice(&trailer);

    let finished = file
        .write_all(&trailer)
        .and_then(|_| file.flush())
        .and_then(|_| file.get_ref().sync_all())
        .and_then(|_| std::fs::rename(&temp_path, path));

    if let Err(e) = finished {
        discard(&temp_path);
        return Err(e.into());
    }

    debug!("Snapshot written to {} ({} bytes)", path.display(), payload.len());

    Ok(payload.freeze())
}

fn discard(temp_path: &Path) {
    if let Err(e) = std::fs::remove_file(temp_path) {
        debug!("Could not remove {}: {}", temp_path.display(), e);
    }
}

/// Reads the snapshot at `path`, if there is one, into loader commands.
pub async fn load_snapshot_file(path: &Path) -> Result<Option<Vec<Vec<String>>>, SnapshotError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => snapshot_to_commands(&bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
