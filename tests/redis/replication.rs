use std::time::Duration;

use bytes::Bytes;
use regis::{
    connection::ConnId,
    executor::Event,
    rdb::snapshot_to_commands,
    resp::RespValue,
    store::PartitionState,
};

use crate::test_utils::{decode_all, ok, TestEnv};

/// A FULLRESYNC reply taken apart.
struct FullResync {
    replid: String,
    offset: i64,
    payload: Bytes,
    stream: Vec<RespValue>,
}

fn split_full_resync(data: &[u8]) -> FullResync {
    // Keepalive newlines may precede the reply.
    let skipped = data.iter().take_while(|b| **b == b'\n').count();
    let data = &data[skipped..];

    let text_end = |from: usize| {
        from + data[from..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .expect("missing line terminator")
    };

    let header_end = text_end(0);
    let header = std::str::from_utf8(&data[..header_end]).unwrap();
    let parts: Vec<&str> = header.split(' ').collect();
    assert_eq!(parts[0], "+FULLRESYNC", "{}", header);

    let length_end = text_end(header_end + 2);
    let length_line = std::str::from_utf8(&data[header_end + 2..length_end]).unwrap();
    let length: usize = length_line.trim_start_matches('$').parse().unwrap();

    let payload_start = length_end + 2;
    let payload = Bytes::copy_from_slice(&data[payload_start..payload_start + length]);

    FullResync {
        replid: parts[1].to_string(),
        offset: parts[2].parse().unwrap(),
        payload,
        stream: decode_all(&data[payload_start + length..]),
    }
}

fn command(values: &[&str]) -> RespValue {
    RespValue::command(values)
}

/// Connects a replica, runs the handshake and PSYNC.
fn attach_replica(env: &mut TestEnv, replid: &str, offset: i64) -> ConnId {
    let replica = env.connect();

    assert_eq!(
        env.command(replica, &["REPLCONF", "listening-port", "6380"]),
        ok()
    );
    assert_eq!(
        env.command(replica, &["REPLCONF", "capa", "eof", "capa", "psync2"]),
        ok()
    );
    env.send(replica, &["PSYNC", replid, &offset.to_string()]);

    replica
}

#[tokio::test]
async fn test_full_resync() {
    let mut env = TestEnv::new();
    let writer = env.connect();

    env.command(writer, &["SET", "a", "1"]);

    let replica = attach_replica(&mut env, "?", -1);

    // The reply waits for the snapshot.
    assert!(env.output(replica).is_empty());
    assert_eq!(env.state().partitions.status(), PartitionState::Frozen);

    env.command(writer, &["SET", "b", "2"]);
    env.settle().await;

    let sync = split_full_resync(&env.output(replica));

    assert_eq!(sync.replid, env.state().master.identity().replid);
    assert_eq!(sync.offset, 0);

    let loaded = snapshot_to_commands(&sync.payload).unwrap();
    assert!(loaded.contains(&vec!["SET".to_string(), "a".to_string(), "1".to_string()]));
    assert!(!loaded.iter().any(|c| c.get(1).is_some_and(|k| k == "b")));

    // Writes made while the snapshot was written follow it.
    assert_eq!(
        sync.stream,
        vec![command(&["SELECT", "0"]), command(&["SET", "b", "2"])]
    );

    env.command(writer, &["SELECT", "2"]);
    env.command(writer, &["RPUSH", "l", "x"]);
    env.command(writer, &["GET", "l"]);

    assert_eq!(
        decode_all(&env.output(replica)),
        vec![command(&["SELECT", "2"]), command(&["RPUSH", "l", "x"])]
    );

    let info = env.command(writer, &["INFO", "replication"]);
    assert!(info.contains("connected_slaves:1"), "{}", info);
    assert!(info.contains("slave0:ip=127.0.0.1,port=6380,state=online"), "{}", info);
    assert!(info.contains("repl_backlog_active:1"), "{}", info);
}

#[tokio::test]
async fn test_relative_expiry_is_propagated_as_absolute() {
    let mut env = TestEnv::new();
    let writer = env.connect();
    let replica = attach_replica(&mut env, "?", -1);
    env.settle().await;
    env.output(replica);

    env.command(writer, &["SET", "k", "v", "PX", "60000"]);

    let stream = decode_all(&env.output(replica));
    let Some(RespValue::Array(parts)) = stream.last() else {
        panic!("expected a command, got {:?}", stream);
    };

    assert_eq!(parts.len(), 5);
    assert_eq!(parts[3], RespValue::BulkString("PXAT".to_string()));

    let expiry = env.state_mut().partition(0).unwrap().expiry("k").unwrap();
    assert_eq!(parts[4], RespValue::BulkString(expiry.to_string()));
}

#[tokio::test]
async fn test_partial_resync_replays_the_backlog() {
    let mut env = TestEnv::new();
    let writer = env.connect();
    let replica = attach_replica(&mut env, "?", -1);
    env.settle().await;
    env.output(replica);

    env.command(writer, &["SET", "a", "1"]);
    let replid = env.state().master.identity().replid.clone();
    let offset = env.state().master.offset();

    env.disconnect(replica);
    assert_eq!(env.state().master.replica_count(), 0);

    env.command(writer, &["SET", "b", "2"]);
    env.command(writer, &["DEL", "a"]);

    let replica = attach_replica(&mut env, &replid, offset);
    let data = env.output(replica);

    let expected_header = format!("+CONTINUE {}\r\n", replid);
    assert!(data.starts_with(expected_header.as_bytes()));
    assert_eq!(
        decode_all(&data[expected_header.len()..]),
        vec![command(&["SET", "b", "2"]), command(&["DEL", "a"])]
    );

    // No snapshot was needed.
    assert_eq!(env.state().partitions.status(), PartitionState::Normal);

    env.command(writer, &["SET", "c", "3"]);
    assert_eq!(
        decode_all(&env.output(replica)),
        vec![command(&["SET", "c", "3"])]
    );
}

#[tokio::test]
async fn test_full_resync_after_backlog_wraparound() {
    let mut env = TestEnv::with_config(|config| config.repl_backlog_size = 64);
    let writer = env.connect();
    let replica = attach_replica(&mut env, "?", -1);
    env.settle().await;
    env.output(replica);

    let replid = env.state().master.identity().replid.clone();
    let offset = env.state().master.offset();
    env.disconnect(replica);

    for i in 0..10 {
        env.command(writer, &["SET", &format!("key{}", i), "some value"]);
    }

    let replica = attach_replica(&mut env, &replid, offset);
    assert!(env.output(replica).is_empty());
    assert_eq!(env.state().partitions.status(), PartitionState::Frozen);

    env.settle().await;

    let sync = split_full_resync(&env.output(replica));
    assert_eq!(sync.replid, replid);
    assert_eq!(sync.offset, env.state().master.offset());
    assert_eq!(snapshot_to_commands(&sync.payload).unwrap().len(), 11);
}

#[tokio::test]
async fn test_unknown_history_gets_a_full_resync() {
    let mut env = TestEnv::new();
    let writer = env.connect();
    let first = attach_replica(&mut env, "?", -1);
    env.settle().await;
    env.output(first);
    env.command(writer, &["SET", "a", "1"]);

    let offset = env.state().master.offset();
    let test_cases = vec![
        ("0123456789012345678901234567890123456789".to_string(), 0),
        (env.state().master.identity().replid.clone(), offset + 100),
    ];

    for (replid, offset) in test_cases {
        let replica = attach_replica(&mut env, &replid, offset);
        assert!(env.output(replica).is_empty(), "{} {}", replid, offset);

        env.settle().await;
        let sync = split_full_resync(&env.output(replica));
        assert_eq!(sync.replid, env.state().master.identity().replid);
    }

    assert_eq!(env.state().master.replica_count(), 3);
}

#[tokio::test]
async fn test_psync_during_foreign_snapshot_waits_for_cron() {
    let mut env = TestEnv::new();
    let writer = env.connect();

    env.command(writer, &["BGSAVE"]);
    let replica = attach_replica(&mut env, "?", -1);

    let info = env.command(writer, &["INFO", "replication"]);
    assert!(info.contains("state=need_bgsave"), "{}", info);

    env.settle().await;
    assert!(env.output(replica).is_empty());

    tokio::time::pause();
    tokio::time::advance(Duration::from_secs(2)).await;
    env.executor.handle(Event::ReplicationCron);

    let trigger = env.executor.try_next_event();
    assert!(matches!(trigger, Some(Event::SnapshotTrigger)), "{:?}", trigger);
    tokio::time::resume();

    env.executor.handle(Event::SnapshotTrigger);
    assert_eq!(env.state().partitions.status(), PartitionState::Frozen);

    env.settle().await;
    let sync = split_full_resync(&env.output(replica));
    assert_eq!(sync.offset, 0);
}

#[tokio::test]
async fn test_replica_cron_pings_and_times_out() {
    let mut env = TestEnv::new();
    let replica = attach_replica(&mut env, "?", -1);
    env.settle().await;
    env.output(replica);

    tokio::time::pause();

    tokio::time::advance(Duration::from_secs(11)).await;
    env.executor.handle(Event::ReplicationCron);
    assert_eq!(decode_all(&env.output(replica)), vec![command(&["PING"])]);

    env.send(replica, &["REPLCONF", "ACK", "14"]);
    assert!(env.output(replica).is_empty());

    tokio::time::advance(Duration::from_secs(61)).await;
    env.executor.handle(Event::ReplicationCron);

    assert!(env.was_closed(replica));
    assert_eq!(env.state().master.replica_count(), 0);
}

#[tokio::test]
async fn test_replicaof_no_one_keeps_previous_history() {
    let mut env = TestEnv::new();
    let admin = env.connect();

    let old_replid = env.state().master.identity().replid.clone();

    assert_eq!(
        env.command(admin, &["REPLICAOF", "127.0.0.1", "1"]),
        ok()
    );
    assert_eq!(
        env.command(admin, &["SLAVEOF", "127.0.0.1", "1"]),
        "+OK Already connected to specified master\r\n"
    );
    assert_eq!(
        env.command(admin, &["REPLICAOF", "127.0.0.1", "port"]),
        "-ERR Invalid master port\r\n"
    );

    assert_eq!(env.command(admin, &["REPLICAOF", "NO", "ONE"]), ok());

    let identity = env.state().master.identity().clone();
    assert_ne!(identity.replid, old_replid);
    assert_eq!(identity.replid2, old_replid);
    assert_eq!(identity.second_offset, 0);

    let info = env.command(admin, &["INFO", "replication"]);
    assert!(info.contains("role:master"), "{}", info);
}
