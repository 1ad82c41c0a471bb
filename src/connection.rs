//! Client connections.
//!
//! Each accepted socket gets one task that decodes frames into executor
//! events and writes whatever the executor queues for it. The executor only
//! ever refers to a connection by its id, through the [`ClientRegistry`].

use std::collections::{BTreeMap, HashSet};

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::Instant,
};
use tracing::{debug, warn};

use crate::{
    executor::{Event, EventSender},
    resp::{take_frames, Frame},
};

pub type ConnId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Data(Bytes),
    Close,
}

#[derive(Debug)]
pub struct ClientHandle {
    pub id: ConnId,
    pub addr: String,
    pub db_index: usize,
    pub created: Instant,
    pub last_interaction: Instant,
    pub listening_port: Option<u16>,
    pub subscriptions: HashSet<String>,
    sender: UnboundedSender<Outbound>,
}

impl ClientHandle {
    pub fn new(id: ConnId, addr: String, sender: UnboundedSender<Outbound>) -> Self {
        let now = Instant::now();

        Self {
            id,
            addr,
            db_index: 0,
            created: now,
            last_interaction: now,
            listening_port: None,
            subscriptions: HashSet::new(),
            sender,
        }
    }

    /// Host part of the peer address.
    pub fn ip(&self) -> &str {
        self.addr
            .rsplit_once(':')
            .map(|(ip, _)| ip)
            .unwrap_or(&self.addr)
    }
}

/// Every open connection, keyed by id.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<ConnId, ClientHandle>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, client: ClientHandle) {
        self.clients.insert(client.id, client);
    }

    pub fn remove(&mut self, id: ConnId) -> Option<ClientHandle> {
        self.clients.remove(&id)
    }

    pub fn get(&self, id: ConnId) -> Option<&ClientHandle> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut ClientHandle> {
        self.clients.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientHandle> {
        self.clients.values()
    }

    /// Queues bytes for a connection. Returns false if it is gone.
    pub fn send(&self, id: ConnId, data: Bytes) -> bool {
        self.clients
            .get(&id)
            .is_some_and(|client| client.sender.send(Outbound::Data(data)).is_ok())
    }

    /// Asks the connection task to shut the socket once queued bytes are written.
    pub fn close(&self, id: ConnId) -> bool {
        self.clients
            .get(&id)
            .is_some_and(|client| client.sender.send(Outbound::Close).is_ok())
    }
}

/// Drives one client socket until either side closes it.
pub async fn handle_connection(stream: TcpStream, id: ConnId, addr: String, events: EventSender) {
    let (sender, receiver) = mpsc::unbounded_channel();

    if events
        .send(Event::Connected {
            id,
            addr: addr.clone(),
            sender,
        })
        .is_err()
    {
        return;
    }

    if let Err(e) = serve(stream, id, &events, receiver).await {
        debug!("Connection {} ({}) ended: {}", id, addr, e);
    }

    let _ = events.send(Event::Disconnected { id });
}

async fn serve(
    stream: TcpStream,
    id: ConnId,
    events: &EventSender,
    mut outbound: UnboundedReceiver<Outbound>,
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            read = reader.read_buf(&mut buffer) => {
                if read? == 0 {
                    return Ok(());
                }

                match take_frames(&mut buffer) {
                    Ok(frames) => {
                        for (frame, _) in frames {
                            if let Frame::Value(command) = frame {
                                if events.send(Event::Command { id, command }).is_err() {
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Protocol error from connection {}: {}", id, e);
                        writer.write_all(e.as_string().as_bytes()).await?;
                        return Ok(());
                    }
                }
            }
            message = outbound.recv() => match message {
                Some(Outbound::Data(data)) => writer.write_all(&data).await?,
                Some(Outbound::Close) | None => {
                    writer.flush().await?;
                    return Ok(());
                }
            },
        }
    }
}
