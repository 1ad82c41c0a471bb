use std::{collections::BTreeMap, sync::Arc, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    connection::{ClientRegistry, ConnId},
    replication::{backlog::Backlog, identity::ReplicationIdentity},
    resp::RespValue,
};

/// How long a replica may sit in NeedSnapshot before the cron starts a snapshot for it.
const NEED_SNAPSHOT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    NeedSnapshot,
    WaitingSnapshotEnd,
    SendingSnapshot,
    Online,
}

impl ReplicaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaState::NeedSnapshot => "need_bgsave",
            ReplicaState::WaitingSnapshotEnd => "wait_bgsave",
            ReplicaState::SendingSnapshot => "send_bulk",
            ReplicaState::Online => "online",
        }
    }
}

/// Master-side view of one connected replica.
#[derive(Debug, Clone)]
pub struct Replica {
    pub state: ReplicaState,
    pub ack_offset: i64,
    pub last_heartbeat: Instant,
    pub need_since: Instant,
    pub addr: String,
    pub listening_port: Option<u16>,
}

/// Decides how each replica is synchronized and fans the write stream out to them.
#[derive(Debug)]
pub struct MasterCoordinator {
    identity: ReplicationIdentity,
    backlog: Option<Arc<Backlog>>,
    backlog_size: usize,
    replicas: BTreeMap<ConnId, Replica>,
    /// Partition last selected in the outgoing stream. None forces a SELECT before the next write.
    stream_db: Option<usize>,
    snapshot_offset: i64,
    last_ping: Instant,
    idle_since: Option<Instant>,
}

impl MasterCoordinator {
    pub fn new(backlog_size: usize) -> Self {
        Self {
            identity: ReplicationIdentity::new(),
            backlog: None,
            backlog_size,
            replicas: BTreeMap::new(),
            stream_db: None,
            snapshot_offset: 0,
            last_ping: Instant::now(),
            idle_since: None,
        }
    }

    pub fn identity(&self) -> &ReplicationIdentity {
        &self.identity
    }

    pub fn identity_mut(&mut self) -> &mut ReplicationIdentity {
        &mut self.identity
    }

    pub fn backlog(&self) -> Option<&Arc<Backlog>> {
        self.backlog.as_ref()
    }

    /// Returns the backlog, allocating an inactive one if there is none.
    pub fn ensure_backlog(&mut self) -> Arc<Backlog> {
        let size = self.backlog_size;
        Arc::clone(
            self.backlog
                .get_or_insert_with(|| Arc::new(Backlog::new(size))),
        )
    }

    /// Current replication offset, zero when no stream has ever been recorded.
    pub fn offset(&self) -> i64 {
        self.backlog
            .as_ref()
            .map_or(0, |backlog| backlog.write_offset())
    }

    pub fn replicas(&self) -> impl Iterator<Item = (&ConnId, &Replica)> {
        self.replicas.iter()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_replica(&self, id: ConnId) -> bool {
        self.replicas.contains_key(&id)
    }

    pub fn reset_stream_selector(&mut self) {
        self.stream_db = None;
    }

    /// Serves a sync request from the backlog if the replica shares our history.
    ///
    /// Returns false when a full resync is needed instead. Nothing is sent in that case.
    pub fn try_partial_resync(
        &mut self,
        id: ConnId,
        replid: &str,
        offset: i64,
        clients: &ClientRegistry,
    ) -> bool {
        let Some(backlog) = &self.backlog else {
            return false;
        };

        if !backlog.is_active() || !self.identity.matches(replid, offset) {
            return false;
        }

        let tail = match backlog.read(offset) {
            Ok(tail) => tail,
            Err(e) => {
                debug!("Partial resync for connection {} refused: {}", id, e);
                return false;
            }
        };

        let mut reply = BytesMut::new();
        reply.put(format!("+CONTINUE {}\r\n", self.identity.replid).as_bytes());
        reply.put(tail);
        clients.send(id, reply.freeze());

        self.replicas
            .insert(id, new_replica(id, ReplicaState::Online, offset, clients));

        info!(
            "Partial resync accepted for connection {} from offset {}",
            id, offset
        );

        true
    }

    /// Registers a replica that needs a full snapshot.
    ///
    /// The first replica ever seen allocates the backlog, which starts a new
    /// history at the offset the replica asked for.
    pub fn begin_full_resync(&mut self, id: ConnId, peer_offset: i64, clients: &ClientRegistry) {
        if self.backlog.is_none() {
            let backlog = Arc::new(Backlog::new(self.backlog_size));
            backlog.reset(peer_offset.max(0));
            backlog.activate();

            self.identity.rotate();
            self.backlog = Some(backlog);
            self.stream_db = None;

            info!(
                "Replication backlog created ({} bytes), replid {}",
                self.backlog_size, self.identity.replid
            );
        }

        self.replicas.insert(
            id,
            new_replica(id, ReplicaState::NeedSnapshot, peer_offset, clients),
        );
    }

    pub fn has_waiting(&self) -> bool {
        self.replicas
            .values()
            .any(|replica| replica.state == ReplicaState::WaitingSnapshotEnd)
    }

    pub fn has_need_snapshot(&self) -> bool {
        self.replicas
            .values()
            .any(|replica| replica.state == ReplicaState::NeedSnapshot)
    }

    /// Moves every replica that needs a snapshot to waiting for the one in flight.
    pub fn mark_waiting(&mut self) -> usize {
        let mut marked = 0;

        for replica in self.replicas.values_mut() {
            if replica.state == ReplicaState::NeedSnapshot {
                replica.state = ReplicaState::WaitingSnapshotEnd;
                marked += 1;
            }
        }

        marked
    }

    /// Records where the stream stood when a background snapshot froze the keyspace.
    pub fn snapshot_started(&mut self) {
        self.snapshot_offset = self.offset();
        self.stream_db = None;
    }

    /// Ships a finished snapshot to every waiting replica, followed by the
    /// stream written since the snapshot started.
    pub fn finish_full_sync(&mut self, payload: &Bytes, clients: &ClientRegistry) {
        let waiting = self.ids_in(ReplicaState::WaitingSnapshotEnd);

        if waiting.is_empty() {
            return;
        }

        let Some(backlog) = self.backlog.clone() else {
            self.close_replicas(&waiting, clients);
            return;
        };

        let now = Instant::now();

        for id in waiting {
            let tail = match backlog.read(self.snapshot_offset) {
                Ok(tail) => tail,
                Err(e) => {
                    warn!("Cannot stream backlog to replica {}: {}", id, e);
                    self.close_replicas(&[id], clients);
                    continue;
                }
            };

            let Some(replica) = self.replicas.get_mut(&id) else {
                continue;
            };

            replica.state = ReplicaState::SendingSnapshot;

            let mut out = BytesMut::with_capacity(payload.len() + tail.len() + 128);
            out.put(
                format!(
                    "+FULLRESYNC {} {}\r\n",
                    self.identity.replid, self.snapshot_offset
                )
                .as_bytes(),
            );
            out.put(format!("${}\r\n", payload.len()).as_bytes());
            out.put(payload.as_ref());
            out.put(tail);

            if clients.send(id, out.freeze()) {
                replica.state = ReplicaState::Online;
                replica.last_heartbeat = now;
                info!(
                    "Full resync sent to replica {} ({} snapshot bytes)",
                    id,
                    payload.len()
                );
            }
        }

        self.stream_db = None;
    }

    /// Drops every replica that was waiting on a snapshot that failed.
    pub fn fail_full_sync(&mut self, clients: &ClientRegistry) {
        let waiting = self.ids_in(ReplicaState::WaitingSnapshotEnd);

        if !waiting.is_empty() {
            warn!(
                "Closing {} replica(s) waiting on a failed snapshot",
                waiting.len()
            );
        }

        self.close_replicas(&waiting, clients);
    }

    /// Appends bytes to the replication stream and forwards them to online replicas.
    ///
    /// With `db` set, a SELECT is emitted first whenever the stream currently
    /// points at another partition.
    pub fn feed(&mut self, data: &[u8], db: Option<usize>, clients: &ClientRegistry) {
        let Some(backlog) = self.backlog.clone() else {
            return;
        };

        let mut out = BytesMut::with_capacity(data.len() + 32);

        if let Some(db) = db {
            if self.stream_db != Some(db) {
                out.put(
                    RespValue::command(&["SELECT".to_string(), db.to_string()])
                        .encode()
                        .as_bytes(),
                );
                self.stream_db = Some(db);
            }
        }

        out.put(data);
        backlog.write(&out);

        let out = out.freeze();

        for (id, replica) in self.replicas.iter() {
            if replica.state == ReplicaState::Online {
                clients.send(*id, out.clone());
            }
        }
    }

    /// Records an acknowledgement. Returns false for connections that are not replicas.
    pub fn acknowledge(&mut self, id: ConnId, offset: i64) -> bool {
        let Some(replica) = self.replicas.get_mut(&id) else {
            return false;
        };

        replica.ack_offset = replica.ack_offset.max(offset);
        replica.last_heartbeat = Instant::now();
        true
    }

    pub fn touch(&mut self, id: ConnId) {
        if let Some(replica) = self.replicas.get_mut(&id) {
            replica.last_heartbeat = Instant::now();
        }
    }

    pub fn remove_replica(&mut self, id: ConnId) -> Option<Replica> {
        self.replicas.remove(&id)
    }

    /// Disconnects every replica.
    pub fn free_replicas(&mut self, clients: &ClientRegistry) {
        let ids: Vec<ConnId> = self.replicas.keys().copied().collect();

        if !ids.is_empty() {
            info!("Disconnecting {} replica(s)", ids.len());
        }

        self.close_replicas(&ids, clients);
    }

    /// Periodic replica upkeep. Returns true if a replica has waited long
    /// enough for a snapshot that one should be started.
    pub fn cron(&mut self, clients: &ClientRegistry, settings: &CronSettings) -> bool {
        let now = Instant::now();

        if !settings.is_slave
            && !self.replicas.is_empty()
            && now.duration_since(self.last_ping) >= settings.ping_period
        {
            self.last_ping = now;
            self.feed(RespValue::command(&["PING"]).encode().as_bytes(), None, clients);
        }

        let mut timed_out = Vec::new();

        for (id, replica) in self.replicas.iter() {
            match replica.state {
                ReplicaState::NeedSnapshot | ReplicaState::WaitingSnapshotEnd => {
                    clients.send(*id, Bytes::from_static(b"\n"));
                }
                _ => {}
            }

            let watched = matches!(
                replica.state,
                ReplicaState::Online | ReplicaState::WaitingSnapshotEnd
            );

            if watched && now.duration_since(replica.last_heartbeat) > settings.timeout {
                timed_out.push(*id);
            }
        }

        for id in &timed_out {
            warn!("Replica {} timed out", id);
        }
        self.close_replicas(&timed_out, clients);

        if self.replicas.is_empty() {
            let idle_since = *self.idle_since.get_or_insert(now);

            if !settings.is_slave
                && self.backlog.is_some()
                && now.duration_since(idle_since) >= settings.backlog_ttl
            {
                self.backlog = None;
                self.stream_db = None;
                self.identity.rotate();
                info!("Replication backlog freed after {:?} without replicas", settings.backlog_ttl);
            }
        } else {
            self.idle_since = None;
        }

        self.replicas.values().any(|replica| {
            replica.state == ReplicaState::NeedSnapshot
                && now.duration_since(replica.need_since) >= NEED_SNAPSHOT_GRACE
        })
    }

    fn ids_in(&self, state: ReplicaState) -> Vec<ConnId> {
        self.replicas
            .iter()
            .filter(|(_, replica)| replica.state == state)
            .map(|(id, _)| *id)
            .collect()
    }

    fn close_replicas(&mut self, ids: &[ConnId], clients: &ClientRegistry) {
        for id in ids {
            self.replicas.remove(id);
            clients.close(*id);
        }
    }
}

/// Knobs the coordinator's cron reads from the server configuration.
#[derive(Debug, Clone)]
pub struct CronSettings {
    pub is_slave: bool,
    pub ping_period: Duration,
    pub timeout: Duration,
    pub backlog_ttl: Duration,
}

fn new_replica(id: ConnId, state: ReplicaState, offset: i64, clients: &ClientRegistry) -> Replica {
    let now = Instant::now();
    let client = clients.get(id);

    Replica {
        state,
        ack_offset: offset.max(0),
        last_heartbeat: now,
        need_since: now,
        addr: client.map(|c| c.ip().to_string()).unwrap_or_default(),
        listening_port: client.and_then(|c| c.listening_port),
    }
}
