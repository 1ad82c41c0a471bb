use std::time::Duration;

use bytes::Bytes;
use regis::{
    executor::Event,
    replication::{LinkEvent, SlaveState},
    resp::RespValue,
};

use crate::test_utils::{bulk, decode_all, integer, null, TestEnv};

const MASTER_REPLID: &str = "8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb";

/// A snapshot produced by a separate master holding a few keys.
fn master_snapshot() -> Bytes {
    let mut master = TestEnv::new();
    let client = master.connect();

    master.command(client, &["SET", "a", "1"]);
    master.command(client, &["RPUSH", "list", "x", "y"]);
    master.command(client, &["SELECT", "1"]);
    master.command(client, &["SET", "b", "2"]);

    master.state_mut().save().unwrap()
}

fn link(env: &mut TestEnv, event: LinkEvent) {
    let epoch = env.state().slave.epoch();
    env.executor.handle(Event::Link { epoch, event });
}

fn stream_command(env: &mut TestEnv, arguments: &[&str]) {
    let raw = Bytes::from(RespValue::command(arguments).encode());
    let arguments = arguments.iter().map(|s| s.to_string()).collect();

    link(env, LinkEvent::Command { arguments, raw });
}

/// A slave that has completed a full resync at offset 100.
fn synced_slave() -> TestEnv {
    let mut env = TestEnv::new();
    env.state_mut().slave.set_master("127.0.0.1".to_string(), 6379);

    link(&mut env, LinkEvent::State(SlaveState::TransferringSnapshot));
    link(
        &mut env,
        LinkEvent::FullSync {
            replid: MASTER_REPLID.to_string(),
            offset: 100,
            payload: master_snapshot(),
        },
    );

    env
}

#[tokio::test]
async fn test_full_sync_replaces_the_keyspace() {
    let mut env = TestEnv::new();
    let client = env.connect();
    env.command(client, &["SET", "stale", "x"]);

    env.state_mut().slave.set_master("127.0.0.1".to_string(), 6379);
    link(
        &mut env,
        LinkEvent::FullSync {
            replid: MASTER_REPLID.to_string(),
            offset: 100,
            payload: master_snapshot(),
        },
    );

    let state = env.state();
    assert_eq!(state.slave.state(), SlaveState::Connected);
    assert_eq!(state.master.identity().replid, MASTER_REPLID);
    assert_eq!(state.master.offset(), 100);
    assert!(state.master.backlog().is_some_and(|backlog| backlog.is_active()));

    assert_eq!(env.command(client, &["GET", "stale"]), null());
    assert_eq!(env.command(client, &["GET", "a"]), bulk("1"));
    assert_eq!(env.command(client, &["LLEN", "list"]), integer(2));
    env.command(client, &["SELECT", "1"]);
    assert_eq!(env.command(client, &["GET", "b"]), bulk("2"));

    let info = env.command(client, &["INFO", "replication"]);
    assert!(info.contains("role:slave"), "{}", info);
    assert!(info.contains("master_port:6379"), "{}", info);
    assert!(info.contains("master_link_status:up"), "{}", info);
}

#[tokio::test]
async fn test_slave_refuses_client_writes() {
    let mut env = synced_slave();
    let client = env.connect();

    assert_eq!(
        env.command(client, &["SET", "a", "2"]),
        "-READONLY You can't write against a read only replica.\r\n"
    );
    assert_eq!(
        env.command(client, &["DEL", "a"]),
        "-READONLY You can't write against a read only replica.\r\n"
    );
    assert_eq!(env.command(client, &["GET", "a"]), bulk("1"));
}

#[tokio::test]
async fn test_stream_commands_are_applied_and_recorded() {
    let mut env = synced_slave();
    let client = env.connect();

    stream_command(&mut env, &["SET", "x", "1"]);
    stream_command(&mut env, &["SELECT", "3"]);
    stream_command(&mut env, &["RPUSH", "l", "a"]);

    assert_eq!(env.state().slave.master_db, 3);
    assert_eq!(env.command(client, &["GET", "x"]), bulk("1"));
    env.command(client, &["SELECT", "3"]);
    assert_eq!(env.command(client, &["LLEN", "l"]), integer(1));

    let expected = [
        RespValue::command(&["SET", "x", "1"]),
        RespValue::command(&["SELECT", "3"]),
        RespValue::command(&["RPUSH", "l", "a"]),
    ];
    let length: usize = expected.iter().map(|c| c.encode().len()).sum();

    assert_eq!(env.state().master.offset(), 100 + length as i64);

    let backlog = env.state().master.backlog().unwrap().read(100).unwrap();
    assert_eq!(decode_all(&backlog), expected.to_vec());
}

#[tokio::test]
async fn test_stale_link_events_are_ignored() {
    let mut env = synced_slave();
    let client = env.connect();
    let epoch = env.state().slave.epoch();

    env.executor.handle(Event::Link {
        epoch: epoch + 1,
        event: LinkEvent::Command {
            arguments: vec!["SET".to_string(), "a".to_string(), "9".to_string()],
            raw: Bytes::from_static(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n9\r\n"),
        },
    });
    assert_eq!(env.command(client, &["GET", "a"]), bulk("1"));

    link(&mut env, LinkEvent::Failed("connection reset".to_string()));
    assert_eq!(env.state().slave.state(), SlaveState::Connect);

    // The old link's epoch is gone with it.
    env.executor.handle(Event::Link {
        epoch,
        event: LinkEvent::State(SlaveState::Connected),
    });
    assert_eq!(env.state().slave.state(), SlaveState::Connect);

    // Commands on a link that has not finished syncing are dropped.
    stream_command(&mut env, &["SET", "a", "9"]);
    assert_eq!(env.command(client, &["GET", "a"]), bulk("1"));
}

#[tokio::test]
async fn test_continue_with_new_replid() {
    let mut env = synced_slave();
    stream_command(&mut env, &["SET", "x", "1"]);
    let offset = env.state().master.offset();

    link(&mut env, LinkEvent::Failed("timeout".to_string()));
    link(&mut env, LinkEvent::State(SlaveState::AwaitSyncReply));

    let new_replid = "c673350b6868f3661bd1231ad1b5389310d0a201".to_string();
    link(
        &mut env,
        LinkEvent::Continue {
            replid: Some(new_replid.clone()),
        },
    );

    let identity = env.state().master.identity().clone();
    assert_eq!(env.state().slave.state(), SlaveState::Connected);
    assert_eq!(identity.replid, new_replid);
    assert_eq!(identity.replid2, MASTER_REPLID);
    assert_eq!(identity.second_offset, offset);

    // Resuming keeps the selected database.
    stream_command(&mut env, &["SET", "y", "2"]);
    let client = env.connect();
    assert_eq!(env.command(client, &["GET", "y"]), bulk("2"));
}

#[tokio::test]
async fn test_chained_replica() {
    let mut env = TestEnv::new();
    env.state_mut().slave.set_master("127.0.0.1".to_string(), 6379);

    let sub_replica = env.connect();
    assert_eq!(
        env.command(sub_replica, &["PSYNC", "?", "-1"]),
        "-NOMASTERLINK Can't SYNC while not connected with my master\r\n"
    );

    link(
        &mut env,
        LinkEvent::FullSync {
            replid: MASTER_REPLID.to_string(),
            offset: 100,
            payload: master_snapshot(),
        },
    );

    // Same history as our master, so the sub-replica can resume from us.
    assert_eq!(
        env.command(sub_replica, &["PSYNC", MASTER_REPLID, "100"]),
        format!("+CONTINUE {}\r\n", MASTER_REPLID)
    );

    stream_command(&mut env, &["SET", "x", "1"]);
    assert_eq!(
        decode_all(&env.output(sub_replica)),
        vec![RespValue::command(&["SET", "x", "1"])]
    );
}

#[tokio::test]
async fn test_getack_is_answered_on_the_master_link() {
    let mut env = synced_slave();
    let client = env.connect();

    // From a regular client GETACK is silently ignored.
    assert_eq!(env.command(client, &["REPLCONF", "GETACK", "*"]), "");
    stream_command(&mut env, &["REPLCONF", "GETACK", "*"]);

    assert_eq!(env.state().slave.state(), SlaveState::Connected);
}

#[tokio::test]
async fn test_client_publish_stays_out_of_the_stream() {
    let mut env = synced_slave();
    let subscriber = env.connect();
    let client = env.connect();
    let sub_replica = env.connect();

    env.command(subscriber, &["SUBSCRIBE", "ch"]);
    assert_eq!(
        env.command(sub_replica, &["PSYNC", MASTER_REPLID, "100"]),
        format!("+CONTINUE {}\r\n", MASTER_REPLID)
    );

    assert_eq!(env.command(client, &["PUBLISH", "ch", "hello"]), integer(1));
    assert_eq!(
        decode_all(&env.output(subscriber)),
        vec![RespValue::command(&["message", "ch", "hello"])]
    );

    assert_eq!(env.state().master.offset(), 100);
    assert!(env.output(sub_replica).is_empty());

    // What the master sends still goes through, byte for byte.
    stream_command(&mut env, &["PUBLISH", "ch", "from-master"]);
    let expected = RespValue::command(&["PUBLISH", "ch", "from-master"]);

    assert_eq!(
        env.state().master.offset(),
        100 + expected.encode().len() as i64
    );
    assert_eq!(decode_all(&env.output(sub_replica)), vec![expected]);
}

#[tokio::test]
async fn test_silent_master_times_out() {
    tokio::time::pause();

    let mut env = synced_slave();
    let client = env.connect();
    let epoch = env.state().slave.epoch();

    tokio::time::advance(Duration::from_secs(30)).await;
    env.executor.handle(Event::ReplicationCron);
    assert_eq!(env.state().slave.state(), SlaveState::Connected);

    // Traffic from the master pushes the deadline back.
    stream_command(&mut env, &["PING"]);
    tokio::time::advance(Duration::from_secs(40)).await;
    env.executor.handle(Event::ReplicationCron);
    assert_eq!(env.state().slave.state(), SlaveState::Connected);

    tokio::time::advance(Duration::from_secs(21)).await;
    env.executor.handle(Event::ReplicationCron);
    assert_eq!(env.state().slave.state(), SlaveState::Connect);
    assert_ne!(env.state().slave.epoch(), epoch);

    env.executor.handle(Event::Link {
        epoch,
        event: LinkEvent::Command {
            arguments: vec!["SET".to_string(), "a".to_string(), "9".to_string()],
            raw: Bytes::from_static(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n9\r\n"),
        },
    });
    assert_eq!(env.command(client, &["GET", "a"]), bulk("1"));
    assert_eq!(env.state().slave.state(), SlaveState::Connect);

    tokio::time::resume();
}

#[tokio::test]
async fn test_stuck_handshake_times_out() {
    tokio::time::pause();

    let mut env = TestEnv::new();
    let client = env.connect();
    env.state_mut().slave.set_master("127.0.0.1".to_string(), 6379);
    link(&mut env, LinkEvent::State(SlaveState::AwaitSyncReply));
    let epoch = env.state().slave.epoch();

    tokio::time::advance(Duration::from_secs(59)).await;
    env.executor.handle(Event::ReplicationCron);
    assert_eq!(env.state().slave.state(), SlaveState::AwaitSyncReply);

    tokio::time::advance(Duration::from_secs(2)).await;
    env.executor.handle(Event::ReplicationCron);
    assert_eq!(env.state().slave.state(), SlaveState::Connect);

    // A sync reply arriving late on the abandoned link is dropped.
    env.executor.handle(Event::Link {
        epoch,
        event: LinkEvent::FullSync {
            replid: MASTER_REPLID.to_string(),
            offset: 100,
            payload: master_snapshot(),
        },
    });
    assert_eq!(env.state().slave.state(), SlaveState::Connect);
    assert_eq!(env.command(client, &["GET", "a"]), null());
    assert_ne!(env.state().master.identity().replid, MASTER_REPLID);

    tokio::time::resume();
}
