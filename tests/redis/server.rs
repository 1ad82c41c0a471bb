use std::time::Duration;

use bytes::BytesMut;
use regis::{
    config::Config,
    resp::{parse_frame, Frame, RespValue},
    server::RedisServer,
};
use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{sleep, timeout},
};

async fn start_server(dir: &TempDir, replica_of: Option<u16>) -> u16 {
    let config = Config {
        port: 0,
        dir: dir.path().to_path_buf(),
        replicaof: replica_of.map(|port| format!("127.0.0.1 {}", port)),
        ..Config::default()
    };

    let server = RedisServer::bind(config).await.unwrap();
    let port = server.local_addr().unwrap().port();

    tokio::spawn(server.run());
    port
}

async fn read_reply(stream: &mut TcpStream, buffer: &mut BytesMut) -> RespValue {
    loop {
        if let Some((frame, length)) = parse_frame(buffer).unwrap() {
            let _ = buffer.split_to(length);

            if let Frame::Value(value) = frame {
                return value;
            }

            continue;
        }

        let read = timeout(Duration::from_secs(5), stream.read_buf(buffer))
            .await
            .expect("timed out waiting for a reply")
            .unwrap();
        assert!(read > 0, "connection closed");
    }
}

async fn request(stream: &mut TcpStream, buffer: &mut BytesMut, arguments: &[&str]) -> RespValue {
    stream
        .write_all(RespValue::command(arguments).encode().as_bytes())
        .await
        .unwrap();

    read_reply(stream, buffer).await
}

#[tokio::test]
async fn test_serves_clients_over_tcp() {
    let dir = TempDir::new().unwrap();
    let port = start_server(&dir, None).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut buffer = BytesMut::new();

    // Inline commands are accepted too.
    stream.write_all(b"PING\r\n").await.unwrap();
    assert_eq!(
        read_reply(&mut stream, &mut buffer).await,
        RespValue::SimpleString("PONG".to_string())
    );

    assert_eq!(
        request(&mut stream, &mut buffer, &["SET", "a", "1"]).await,
        RespValue::ok()
    );
    assert_eq!(
        request(&mut stream, &mut buffer, &["GET", "a"]).await,
        RespValue::BulkString("1".to_string())
    );
    assert_eq!(
        request(&mut stream, &mut buffer, &["SAVE"]).await,
        RespValue::ok()
    );

    assert!(dir.path().join("dump.rdb").exists());
}

#[tokio::test]
async fn test_loads_snapshot_on_startup() {
    let dir = TempDir::new().unwrap();

    {
        let port = start_server(&dir, None).await;
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut buffer = BytesMut::new();

        request(&mut stream, &mut buffer, &["RPUSH", "list", "a", "b"]).await;
        request(&mut stream, &mut buffer, &["SAVE"]).await;
    }

    let port = start_server(&dir, None).await;
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut buffer = BytesMut::new();

    assert_eq!(
        request(&mut stream, &mut buffer, &["LLEN", "list"]).await,
        RespValue::Integer(2)
    );
}

#[tokio::test]
async fn test_master_and_replica_over_tcp() {
    let master_dir = TempDir::new().unwrap();
    let replica_dir = TempDir::new().unwrap();

    let master_port = start_server(&master_dir, None).await;
    let mut master = TcpStream::connect(("127.0.0.1", master_port)).await.unwrap();
    let mut master_buffer = BytesMut::new();

    request(&mut master, &mut master_buffer, &["SET", "before", "1"]).await;

    let replica_port = start_server(&replica_dir, Some(master_port)).await;
    let mut replica = TcpStream::connect(("127.0.0.1", replica_port)).await.unwrap();
    let mut replica_buffer = BytesMut::new();

    request(&mut master, &mut master_buffer, &["SET", "after", "2"]).await;

    let expected = [
        ("before", RespValue::BulkString("1".to_string())),
        ("after", RespValue::BulkString("2".to_string())),
    ];

    for (key, value) in expected {
        let mut attempts = 0;

        loop {
            let reply = request(&mut replica, &mut replica_buffer, &["GET", key]).await;

            if reply == value {
                break;
            }

            attempts += 1;
            assert!(attempts < 100, "{} never reached the replica", key);
            sleep(Duration::from_millis(100)).await;
        }
    }

    assert_eq!(
        request(&mut replica, &mut replica_buffer, &["SET", "x", "1"]).await,
        RespValue::Error("READONLY You can't write against a read only replica.".to_string())
    );
}
