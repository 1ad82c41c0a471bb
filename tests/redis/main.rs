mod commands;
mod pub_sub;
mod replication;
mod server;
mod slave;
mod test_utils;
