//! An in-memory key-value server speaking the Redis protocol.
//!
//! All state lives in a single [`executor::Executor`] that handles one event
//! at a time. Snapshots are written in the background from frozen views of
//! the keyspace while writes continue into per-partition shadow stores, and
//! the same snapshots bootstrap replicas, which then follow the master's
//! write stream and can resume from a backlog after a disconnect.

pub mod commands;
pub mod config;
pub mod connection;
pub mod executor;
pub mod input;
pub mod key_value_store;
pub mod rdb;
pub mod replication;
pub mod resp;
pub mod server;
pub mod store;
