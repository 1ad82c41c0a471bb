//! Master/slave replication: the backlog, node identity, the master-side
//! coordinator and the slave-side link.

mod backlog;
mod identity;
mod master;
mod slave;

pub use backlog::{Backlog, BacklogError};
pub use identity::{generate_replid, is_valid_repl_id, ReplicationIdentity, EMPTY_REPLID};
pub use master::{CronSettings, MasterCoordinator, Replica, ReplicaState};
pub use slave::{LinkEvent, SlaveRole, SlaveState, SyncRequest};
