use std::sync::Arc;

use crate::{
    key_value_store::{Keyspace, Value},
    store::partition::{Partition, PartitionState},
};

/// All databases of the server, plus one coarse status over them.
///
/// The coarse status is what save commands and the replication coordinator
/// look at: Frozen while a snapshot writer is running, Moving while any
/// partition still has shadow entries to merge, Normal otherwise.
#[derive(Debug)]
pub struct PartitionSet {
    partitions: Vec<Partition>,
    status: PartitionState,
}

impl PartitionSet {
    pub fn new(count: usize) -> Self {
        Self {
            partitions: (0..count).map(|_| Partition::new()).collect(),
            status: PartitionState::Normal,
        }
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn status(&self) -> PartitionState {
        self.status
    }

    pub fn get(&self, index: usize) -> Option<&Partition> {
        self.partitions.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Partition> {
        self.partitions.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter()
    }

    /// Freezes every partition and returns the views a snapshot writer should serialize.
    pub fn freeze(&mut self) -> Vec<Arc<Keyspace<Value>>> {
        self.status = PartitionState::Frozen;
        self.partitions.iter_mut().map(Partition::freeze).collect()
    }

    /// Blocks every partition for a foreground save.
    ///
    /// Partitions still merging are merged completely first, so the views
    /// returned are the full visible contents.
    pub fn stop(&mut self) -> Vec<Arc<Keyspace<Value>>> {
        for partition in self.partitions.iter_mut() {
            if partition.state() == PartitionState::Moving {
                partition.merge_all();
            }
        }

        self.status = PartitionState::Stopped;
        self.partitions.iter_mut().map(Partition::stop).collect()
    }

    /// Ends a foreground save.
    pub fn resume(&mut self) {
        for partition in self.partitions.iter_mut() {
            partition.merge_all();
        }

        self.status = PartitionState::Normal;
    }

    /// Marks a partition as fully written. Returns true if it needs draining.
    pub fn partition_written(&mut self, index: usize) -> bool {
        self.partitions
            .get_mut(index)
            .is_some_and(|partition| partition.finish_write() == PartitionState::Moving)
    }

    /// Gives up on the snapshot of a single partition.
    pub fn partition_aborted(&mut self, index: usize) {
        if let Some(partition) = self.partitions.get_mut(index) {
            if partition.state() == PartitionState::Frozen {
                partition.merge_all();
            }
        }
    }

    /// Recomputes the coarse status once no snapshot writer is running.
    pub fn settle(&mut self) -> PartitionState {
        self.status = if self
            .partitions
            .iter()
            .any(|partition| partition.state() == PartitionState::Moving)
        {
            PartitionState::Moving
        } else {
            PartitionState::Normal
        };

        self.status
    }

    /// Runs one merge batch on a partition. Returns true if it is still Moving.
    pub fn drain(&mut self, index: usize, batch: usize) -> bool {
        let Some(partition) = self.partitions.get_mut(index) else {
            return false;
        };

        let normal = partition.drain(batch, &mut rand::thread_rng());

        if normal && self.status == PartitionState::Moving {
            self.settle();
        }

        !normal
    }

    /// Drops every key in every partition.
    ///
    /// A running snapshot writer keeps its own views, so the status stays
    /// Frozen until it reports back.
    pub fn flush(&mut self) {
        for partition in self.partitions.iter_mut() {
            partition.flush();
        }

        if self.status != PartitionState::Frozen {
            self.status = PartitionState::Normal;
        }
    }

    /// Visible key count across all partitions.
    pub fn total_keys(&self) -> usize {
        self.partitions.iter().map(Partition::len).sum()
    }
}
