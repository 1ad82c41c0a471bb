//! Partitioned keyspace with non-blocking snapshot support.

mod partition;
mod partition_set;

pub use partition::{Partition, PartitionState};
pub use partition_set::PartitionSet;
