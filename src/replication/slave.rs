use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    executor::{Event, EventSender},
    input::{parse_bulk_header, read_line, read_payload, CommandReadError},
    replication::identity::is_valid_repl_id,
    resp::{parse_frame, Frame, RespValue},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SlaveState {
    Idle,
    Connect,
    Connecting,
    AwaitPong,
    SendPort,
    AwaitPort,
    SendCapabilities,
    AwaitCapabilities,
    SendSyncRequest,
    AwaitSyncReply,
    TransferringSnapshot,
    Connected,
}

impl SlaveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlaveState::Idle => "none",
            SlaveState::Connect => "connect",
            SlaveState::Connecting => "connecting",
            SlaveState::AwaitPong => "receive_pong",
            SlaveState::SendPort => "send_port",
            SlaveState::AwaitPort => "receive_port",
            SlaveState::SendCapabilities => "send_capa",
            SlaveState::AwaitCapabilities => "receive_capa",
            SlaveState::SendSyncRequest => "send_psync",
            SlaveState::AwaitSyncReply => "receive_psync",
            SlaveState::TransferringSnapshot => "transfer",
            SlaveState::Connected => "connected",
        }
    }

    /// States in which the link is still being established.
    pub fn is_handshaking(&self) -> bool {
        (SlaveState::Connecting..=SlaveState::TransferringSnapshot).contains(self)
    }
}

/// What the link task reports back to the executor.
#[derive(Debug)]
pub enum LinkEvent {
    State(SlaveState),
    Heartbeat,
    FullSync {
        replid: String,
        offset: i64,
        payload: Bytes,
    },
    Continue {
        replid: Option<String>,
    },
    /// One command of the live stream, with the exact bytes it spanned.
    Command {
        arguments: Vec<String>,
        raw: Bytes,
    },
    Failed(String),
}

/// Where to resume from when asking the master to sync.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub listening_port: u16,
    /// None when this node has no history worth continuing.
    pub replid: Option<String>,
    pub offset: i64,
}

#[derive(Debug)]
struct Link {
    task: JoinHandle<()>,
    outbound: UnboundedSender<Bytes>,
}

/// Local state of a node that replicates from a master.
#[derive(Debug)]
pub struct SlaveRole {
    state: SlaveState,
    master: Option<(String, u16)>,
    epoch: u64,
    link: Option<Link>,
    last_io: Instant,
    /// Partition the master's stream currently has selected. Survives reconnects.
    pub master_db: usize,
}

impl Default for SlaveRole {
    fn default() -> Self {
        Self::new()
    }
}

impl SlaveRole {
    pub fn new() -> Self {
        Self {
            state: SlaveState::Idle,
            master: None,
            epoch: 0,
            link: None,
            last_io: Instant::now(),
            master_db: 0,
        }
    }

    pub fn state(&self) -> SlaveState {
        self.state
    }

    pub fn master(&self) -> Option<&(String, u16)> {
        self.master.as_ref()
    }

    /// Whether this node is configured to follow a master.
    pub fn is_active(&self) -> bool {
        self.master.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.state == SlaveState::Connected
    }

    pub fn is_following(&self, host: &str, port: u16) -> bool {
        self.master
            .as_ref()
            .is_some_and(|(h, p)| h == host && *p == port)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Events from an older link are stale and must be ignored.
    pub fn accepts(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.state != SlaveState::Idle
    }

    pub fn last_io(&self) -> Instant {
        self.last_io
    }

    pub fn touch(&mut self) {
        self.last_io = Instant::now();
    }

    /// Starts following `host:port`. The connection is made on the next cron tick.
    pub fn set_master(&mut self, host: String, port: u16) {
        self.drop_link();
        info!("Replicating from {}:{}", host, port);
        self.master = Some((host, port));
        self.state = SlaveState::Connect;
    }

    /// Stops following any master.
    pub fn unset_master(&mut self) {
        self.drop_link();

        if let Some((host, port)) = self.master.take() {
            info!("No longer replicating from {}:{}", host, port);
        }

        self.state = SlaveState::Idle;
    }

    /// Drops the current link and retries on the next cron tick.
    pub fn reset_to_connect(&mut self) {
        self.drop_link();

        if self.master.is_some() {
            self.state = SlaveState::Connect;
        }
    }

    pub fn set_state(&mut self, state: SlaveState) {
        debug!("Slave state {} -> {}", self.state.as_str(), state.as_str());
        self.state = state;
        self.touch();
    }

    /// Queues bytes on the link to the master.
    pub fn send_to_master(&self, data: Bytes) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.outbound.send(data).is_ok())
    }

    /// Periodic driver: connects, enforces timeouts and acknowledges the offset.
    pub fn cron(&mut self, request: SyncRequest, timeout: Duration, events: &EventSender) {
        match self.state {
            SlaveState::Idle => {}
            SlaveState::Connect => self.connect(request, timeout, events),
            SlaveState::Connected => {
                if self.last_io.elapsed() > timeout {
                    warn!("Master link timed out, reconnecting");
                    self.reset_to_connect();
                    return;
                }

                let ack = RespValue::command(&[
                    "REPLCONF".to_string(),
                    "ACK".to_string(),
                    request.offset.to_string(),
                ]);
                self.send_to_master(Bytes::from(ack.encode()));
            }
            state if state.is_handshaking() => {
                if self.last_io.elapsed() > timeout {
                    warn!("Timed out in state {}, reconnecting", state.as_str());
                    self.reset_to_connect();
                }
            }
            _ => {}
        }
    }

    fn connect(&mut self, request: SyncRequest, timeout: Duration, events: &EventSender) {
        let Some((host, port)) = self.master.clone() else {
            return;
        };

        self.drop_link();
        self.epoch += 1;
        self.set_state(SlaveState::Connecting);

        let (outbound, receiver) = mpsc::unbounded_channel();
        let target = LinkTarget {
            epoch: self.epoch,
            host,
            port,
            timeout,
            request,
        };

        let task = tokio::spawn(run_link(target, events.clone(), receiver));
        self.link = Some(Link { task, outbound });
    }

    fn drop_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.task.abort();
        }

        self.epoch += 1;
    }
}

#[derive(Debug)]
struct LinkTarget {
    epoch: u64,
    host: String,
    port: u16,
    timeout: Duration,
    request: SyncRequest,
}

async fn run_link(target: LinkTarget, events: EventSender, outbound: UnboundedReceiver<Bytes>) {
    let epoch = target.epoch;

    if let Err(e) = drive_link(&target, &events, outbound).await {
        warn!(
            "Link to master {}:{} failed: {}",
            target.host, target.port, e
        );
        let _ = events.send(Event::Link {
            epoch,
            event: LinkEvent::Failed(e.to_string()),
        });
    }
}

async fn drive_link(
    target: &LinkTarget,
    events: &EventSender,
    mut outbound: UnboundedReceiver<Bytes>,
) -> Result<(), CommandReadError> {
    let report = |event: LinkEvent| {
        let _ = events.send(Event::Link {
            epoch: target.epoch,
            event,
        });
    };

    let stream = tokio::time::timeout(
        target.timeout,
        TcpStream::connect((target.host.as_str(), target.port)),
    )
    .await
    .map_err(|_| CommandReadError::Timeout)??;

    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = BytesMut::with_capacity(4096);

    report(LinkEvent::State(SlaveState::AwaitPong));
    writer.write_all(RespValue::command(&["PING"]).encode().as_bytes()).await?;
    let reply = read_line(&mut reader, &mut buffer, || report(LinkEvent::Heartbeat)).await?;
    if reply.starts_with('-') {
        return Err(CommandReadError::InvalidResponseFromMaster(reply));
    }

    report(LinkEvent::State(SlaveState::SendPort));
    let port = target.request.listening_port.to_string();
    writer
        .write_all(RespValue::command(&["REPLCONF", "listening-port", port.as_str()]).encode().as_bytes())
        .await?;
    report(LinkEvent::State(SlaveState::AwaitPort));
    let reply = read_line(&mut reader, &mut buffer, || report(LinkEvent::Heartbeat)).await?;
    if reply.starts_with('-') {
        debug!("Master refused REPLCONF listening-port: {}", reply);
    }

    report(LinkEvent::State(SlaveState::SendCapabilities));
    writer
        .write_all(RespValue::command(&["REPLCONF", "capa", "eof", "capa", "psync2"]).encode().as_bytes())
        .await?;
    report(LinkEvent::State(SlaveState::AwaitCapabilities));
    let reply = read_line(&mut reader, &mut buffer, || report(LinkEvent::Heartbeat)).await?;
    if reply.starts_with('-') {
        debug!("Master refused REPLCONF capa: {}", reply);
    }

    report(LinkEvent::State(SlaveState::SendSyncRequest));
    let (replid, offset) = match &target.request.replid {
        Some(replid) => (replid.clone(), target.request.offset.to_string()),
        None => ("?".to_string(), "-1".to_string()),
    };
    writer
        .write_all(RespValue::command(&["PSYNC", replid.as_str(), offset.as_str()]).encode().as_bytes())
        .await?;
    report(LinkEvent::State(SlaveState::AwaitSyncReply));
    let reply = read_line(&mut reader, &mut buffer, || report(LinkEvent::Heartbeat)).await?;

    match parse_sync_reply(&reply)? {
        SyncReply::FullResync { replid, offset } => {
            report(LinkEvent::State(SlaveState::TransferringSnapshot));
            let header = read_line(&mut reader, &mut buffer, || report(LinkEvent::Heartbeat)).await?;
            let len = parse_bulk_header(&header)?;
            let payload = read_payload(&mut reader, &mut buffer, len).await?;

            info!(
                "Received {} snapshot bytes from master, offset {}",
                payload.len(),
                offset
            );
            report(LinkEvent::FullSync {
                replid,
                offset,
                payload,
            });
        }
        SyncReply::Continue { replid } => {
            info!("Master accepted partial resync");
            report(LinkEvent::Continue { replid });
        }
    }

    loop {
        while let Some((frame, len)) = parse_frame(&buffer)? {
            let raw = buffer.split_to(len).freeze();

            match frame {
                Frame::KeepAlive => report(LinkEvent::Heartbeat),
                Frame::Value(value) => match value.into_arguments() {
                    Some(arguments) => report(LinkEvent::Command { arguments, raw }),
                    None => warn!("Ignoring non-command frame from master"),
                },
            }
        }

        tokio::select! {
            read = tokio::io::AsyncReadExt::read_buf(&mut reader, &mut buffer) => {
                if read? == 0 {
                    return Err(CommandReadError::ConnectionClosed);
                }
            }
            message = outbound.recv() => match message {
                Some(data) => writer.write_all(&data).await?,
                None => return Ok(()),
            },
        }
    }
}

#[derive(Debug, PartialEq)]
enum SyncReply {
    FullResync { replid: String, offset: i64 },
    Continue { replid: Option<String> },
}

fn parse_sync_reply(line: &str) -> Result<SyncReply, CommandReadError> {
    let invalid = || CommandReadError::InvalidResponseFromMaster(line.to_string());
    let parts: Vec<&str> = line
        .strip_prefix('+')
        .ok_or_else(invalid)?
        .split_whitespace()
        .collect();

    match parts.as_slice() {
        ["FULLRESYNC", replid, offset] if is_valid_repl_id(replid) => Ok(SyncReply::FullResync {
            replid: replid.to_string(),
            offset: offset.parse().map_err(|_| invalid())?,
        }),
        ["CONTINUE"] => Ok(SyncReply::Continue { replid: None }),
        ["CONTINUE", replid] if is_valid_repl_id(replid) => Ok(SyncReply::Continue {
            replid: Some(replid.to_string()),
        }),
        _ => Err(invalid()),
    }
}
