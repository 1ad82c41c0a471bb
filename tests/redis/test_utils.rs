use std::{collections::HashMap, time::Duration};

use bytes::{Bytes, BytesMut};
use regis::{
    config::Config,
    connection::{ConnId, Outbound},
    executor::{Event, Executor, ServerState},
    resp::{take_frames, Frame, RespValue},
};
use tempfile::TempDir;
use tokio::{sync::mpsc::UnboundedReceiver, time::timeout};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// An executor driven directly by the test, with fake client connections
/// whose outbound queues are read back instead of going through sockets.
pub struct TestEnv {
    pub executor: Executor,
    pub dir: TempDir,
    clients: HashMap<ConnId, UnboundedReceiver<Outbound>>,
    next_id: ConnId,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Builds an environment whose snapshots go to a fresh temp directory.
    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().unwrap();

        let mut config = Config {
            dir: dir.path().to_path_buf(),
            drain_interval_ms: 1,
            ..Config::default()
        };
        configure(&mut config);

        Self {
            executor: Executor::new(config),
            dir,
            clients: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn state(&self) -> &ServerState {
        self.executor.state()
    }

    pub fn state_mut(&mut self) -> &mut ServerState {
        self.executor.state_mut()
    }

    pub fn connect(&mut self) -> ConnId {
        self.next_id += 1;
        let id = self.next_id;
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();

        self.executor.handle(Event::Connected {
            id,
            addr: format!("127.0.0.1:{}", 50000 + id),
            sender,
        });
        self.clients.insert(id, receiver);

        id
    }

    pub fn disconnect(&mut self, id: ConnId) {
        self.executor.handle(Event::Disconnected { id });
        self.clients.remove(&id);
    }

    pub fn send(&mut self, id: ConnId, arguments: &[&str]) {
        self.executor.handle(Event::Command {
            id,
            command: RespValue::command(arguments),
        });
    }

    /// Runs a command and returns everything queued for the connection since
    /// the last read, as text.
    pub fn command(&mut self, id: ConnId, arguments: &[&str]) -> String {
        self.send(id, arguments);
        String::from_utf8_lossy(&self.output(id)).to_string()
    }

    /// Drains the connection's outbound queue.
    pub fn output(&mut self, id: ConnId) -> Bytes {
        let mut collected = BytesMut::new();

        if let Some(receiver) = self.clients.get_mut(&id) {
            while let Ok(message) = receiver.try_recv() {
                if let Outbound::Data(data) = message {
                    collected.extend_from_slice(&data);
                }
            }
        }

        collected.freeze()
    }

    /// Whether the executor asked the connection to close.
    pub fn was_closed(&mut self, id: ConnId) -> bool {
        let Some(receiver) = self.clients.get_mut(&id) else {
            return false;
        };

        let mut closed = false;

        while let Ok(message) = receiver.try_recv() {
            closed |= message == Outbound::Close;
        }

        closed
    }

    /// Handles queued events until `done` holds.
    pub async fn pump_until(&mut self, mut done: impl FnMut(&ServerState) -> bool) {
        while !done(self.executor.state()) {
            let event = timeout(EVENT_TIMEOUT, self.executor.next_event())
                .await
                .expect("timed out waiting for an event")
                .expect("event queue closed");

            self.executor.handle(event);
        }
    }

    /// Waits for the background snapshot to finish and every partition to be merged back.
    pub async fn settle(&mut self) {
        self.pump_until(|state| {
            state.partitions.status() == regis::store::PartitionState::Normal
        })
        .await;
    }

    /// Handles whatever is already queued without waiting.
    pub fn pump_ready(&mut self) {
        while let Some(event) = self.executor.try_next_event() {
            self.executor.handle(event);
        }
    }
}

pub fn encode(arguments: &[&str]) -> String {
    RespValue::command(arguments).encode()
}

pub fn bulk(value: &str) -> String {
    RespValue::BulkString(value.to_string()).encode()
}

pub fn integer(value: i64) -> String {
    RespValue::Integer(value).encode()
}

pub fn ok() -> String {
    RespValue::ok().encode()
}

pub fn null() -> String {
    RespValue::Null.encode()
}

/// Splits a byte stream into complete RESP values, skipping keepalives.
pub fn decode_all(data: &[u8]) -> Vec<RespValue> {
    let mut buffer = BytesMut::from(data);

    take_frames(&mut buffer)
        .unwrap()
        .into_iter()
        .filter_map(|(frame, _)| match frame {
            Frame::Value(value) => Some(value),
            Frame::KeepAlive => None,
        })
        .collect()
}
