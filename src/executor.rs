//! The executor owns every piece of mutable server state.
//!
//! Connection tasks, the snapshot writer, merge timers, the replication cron
//! and the master link all talk to it through one unbounded queue, and it
//! handles exactly one [`Event`] at a time. Nothing else touches the keyspace.

use bytes::Bytes;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::{
    commands::{dispatch, CommandError, PubSub},
    config::Config,
    connection::{ClientHandle, ClientRegistry, ConnId, Outbound},
    key_value_store::now_ms,
    rdb::{snapshot_to_commands, write_snapshot, SnapshotError, SnapshotProgress},
    replication::{
        CronSettings, LinkEvent, MasterCoordinator, SlaveRole, SlaveState, SyncRequest,
    },
    resp::RespValue,
    store::{Partition, PartitionSet, PartitionState},
};

pub type EventSender = UnboundedSender<Event>;

#[derive(Debug)]
pub enum Event {
    Connected {
        id: ConnId,
        addr: String,
        sender: UnboundedSender<Outbound>,
    },
    Disconnected {
        id: ConnId,
    },
    Command {
        id: ConnId,
        command: RespValue,
    },
    /// Start a background snapshot for replicas that need one.
    SnapshotTrigger,
    /// Run one merge batch on a Moving partition.
    Drain {
        index: usize,
    },
    Snapshot {
        progress: SnapshotProgress,
    },
    SnapshotFinished {
        result: Result<Bytes, SnapshotError>,
    },
    ReplicationCron,
    Link {
        epoch: u64,
        event: LinkEvent,
    },
}

/// Who issued a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    Client(ConnId),
    /// The replication stream from this node's master.
    Master,
    /// A snapshot being loaded.
    Loader,
}

/// Per-command context handed to every handler.
#[derive(Debug)]
pub struct Session {
    pub source: CommandSource,
    pub db_index: usize,
    /// Set by handlers that must be replicated in a different form than they were issued.
    pub propagate_as: Option<Vec<String>>,
}

impl Session {
    pub fn new(source: CommandSource, db_index: usize) -> Self {
        Self {
            source,
            db_index,
            propagate_as: None,
        }
    }
}

/// Everything the executor owns.
#[derive(Debug)]
pub struct ServerState {
    pub config: Config,
    /// The port this node actually listens on.
    pub port: u16,
    pub partitions: PartitionSet,
    pub clients: ClientRegistry,
    pub master: MasterCoordinator,
    pub slave: SlaveRole,
    pub pub_sub: PubSub,
    pub events: EventSender,
    /// Unix seconds of the last successful save.
    pub last_save: i64,
    pub last_bgsave_ok: bool,
}

impl ServerState {
    pub fn new(config: Config, events: EventSender) -> Self {
        Self {
            port: config.port,
            partitions: PartitionSet::new(config.databases),
            clients: ClientRegistry::new(),
            master: MasterCoordinator::new(config.repl_backlog_size),
            slave: SlaveRole::new(),
            pub_sub: PubSub::default(),
            events,
            last_save: now_ms() / 1000,
            last_bgsave_ok: true,
            config,
        }
    }

    pub fn partition(&mut self, index: usize) -> Result<&mut Partition, CommandError> {
        self.partitions
            .get_mut(index)
            .ok_or(CommandError::DbIndexOutOfRange)
    }

    /// Freezes the keyspace and writes it out on a blocking thread.
    pub fn start_background_save(&mut self) -> Result<(), CommandError> {
        if self.partitions.status() != PartitionState::Normal {
            return Err(CommandError::SaveInProgress);
        }

        let views = self.partitions.freeze();
        self.master.snapshot_started();

        let path = self.config.snapshot_path();
        let events = self.events.clone();

        tokio::task::spawn_blocking(move || {
            let result = write_snapshot(&path, views, |progress| {
                let _ = events.send(Event::Snapshot { progress });
            });
            let _ = events.send(Event::SnapshotFinished { result });
        });

        info!("Background saving started");
        Ok(())
    }

    /// Writes the keyspace out before returning. No other event runs meanwhile.
    pub fn save(&mut self) -> Result<Bytes, CommandError> {
        match self.partitions.status() {
            PartitionState::Normal | PartitionState::Moving => {}
            _ => return Err(CommandError::SaveInProgress),
        }

        let views = self.partitions.stop();
        let result = write_snapshot(&self.config.snapshot_path(), views, |_| {});
        self.partitions.resume();

        match result {
            Ok(payload) => {
                self.last_save = now_ms() / 1000;
                info!("DB saved on disk");
                Ok(payload)
            }
            Err(e) => {
                error!("Save failed: {}", e);
                Err(CommandError::SaveFailed)
            }
        }
    }

    /// Saves, flushes and loads the keyspace back from the fresh snapshot.
    pub fn reload(&mut self) -> Result<(), CommandError> {
        let payload = self.save()?;
        let commands =
            snapshot_to_commands(&payload).map_err(|e| CommandError::LoadFailed(e.to_string()))?;

        self.partitions.flush();
        self.load_commands(commands);
        Ok(())
    }

    /// Gets a snapshot on its way for replicas in NeedSnapshot.
    ///
    /// A snapshot already in flight is reused only if it was started for
    /// replicas. Otherwise the replicas keep waiting and the cron retries once
    /// the keyspace is back to Normal.
    pub fn schedule_full_sync(&mut self) {
        match self.partitions.status() {
            PartitionState::Frozen if self.master.has_waiting() => {
                self.master.mark_waiting();
            }
            PartitionState::Normal => {
                if self.start_background_save().is_ok() {
                    self.master.mark_waiting();
                }
            }
            status => debug!("Full resync deferred while {}", status.as_str()),
        }
    }

    /// Replays loader commands, typically read from a snapshot.
    pub fn load_commands(&mut self, commands: Vec<Vec<String>>) -> usize {
        let mut session = Session::new(CommandSource::Loader, 0);
        let mut failed = 0;

        for command in commands {
            if let Some(reply) = dispatch(self, &mut session, command) {
                if reply.starts_with('-') {
                    warn!("Loading snapshot: {}", reply.trim_end());
                    failed += 1;
                }
            }
        }

        failed
    }

    pub fn sync_request(&self) -> SyncRequest {
        SyncRequest {
            listening_port: self.port,
            replid: self
                .master
                .backlog()
                .map(|_| self.master.identity().replid.clone()),
            offset: self.master.offset(),
        }
    }

    /// Replaces the keyspace with a snapshot received from the master.
    pub fn apply_full_sync(&mut self, replid: String, offset: i64, payload: Bytes) {
        let commands = match snapshot_to_commands(&payload) {
            Ok(commands) => commands,
            Err(e) => {
                error!("Cannot load snapshot from master: {}", e);
                self.slave.reset_to_connect();
                return;
            }
        };

        self.partitions.flush();

        let backlog = self.master.ensure_backlog();
        backlog.deactivate();
        backlog.reset(offset);

        let failed = self.load_commands(commands);
        if failed > 0 {
            warn!("{} snapshot command(s) failed to load", failed);
        }

        backlog.activate();
        self.master.identity_mut().adopt(replid);
        self.master.free_replicas(&self.clients);
        self.master.reset_stream_selector();

        self.slave.master_db = 0;
        self.slave.set_state(SlaveState::Connected);

        info!(
            "Full resync done, {} keys loaded at offset {}",
            self.partitions.total_keys(),
            offset
        );
    }

    fn schedule_drain(&self, index: usize) {
        let events = self.events.clone();
        let delay = self.config.drain_interval();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::Drain { index });
        });
    }
}

pub struct Executor {
    state: ServerState,
    receiver: UnboundedReceiver<Event>,
}

impl Executor {
    pub fn new(config: Config) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        Self {
            state: ServerState::new(config, sender),
            receiver,
        }
    }

    pub fn sender(&self) -> EventSender {
        self.state.events.clone()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ServerState {
        &mut self.state
    }

    pub async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            self.handle(event);
        }
    }

    /// Waits for the next queued event without handling it.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Connected { id, addr, sender } => {
                debug!("Connection {} from {}", id, addr);
                self.state
                    .clients
                    .insert(ClientHandle::new(id, addr, sender));
            }
            Event::Disconnected { id } => self.on_disconnected(id),
            Event::Command { id, command } => self.on_command(id, command),
            Event::SnapshotTrigger => {
                if self.state.master.has_need_snapshot() {
                    self.state.schedule_full_sync();
                }
            }
            Event::Drain { index } => {
                if self.state.partitions.drain(index, self.state.config.drain_batch) {
                    self.state.schedule_drain(index);
                }
            }
            Event::Snapshot { progress } => match progress {
                SnapshotProgress::PartitionWritten(index) => {
                    if self.state.partitions.partition_written(index) {
                        self.state.schedule_drain(index);
                    }
                }
                SnapshotProgress::PartitionAborted(index) => {
                    self.state.partitions.partition_aborted(index);
                }
            },
            Event::SnapshotFinished { result } => self.on_snapshot_finished(result),
            Event::ReplicationCron => self.on_replication_cron(),
            Event::Link { epoch, event } => {
                if self.state.slave.accepts(epoch) {
                    self.on_link_event(event);
                }
            }
        }
    }

    fn on_disconnected(&mut self, id: ConnId) {
        let state = &mut self.state;

        if let Some(client) = state.clients.remove(id) {
            for channel in &client.subscriptions {
                state.pub_sub.unsubscribe(channel, id);
            }
        }

        if state.master.remove_replica(id).is_some() {
            info!("Replica {} disconnected", id);
        }

        debug!("Connection {} closed", id);
    }

    fn on_command(&mut self, id: ConnId, command: RespValue) {
        let state = &mut self.state;

        let Some(client) = state.clients.get_mut(id) else {
            return;
        };

        client.last_interaction = Instant::now();
        let db_index = client.db_index;
        state.master.touch(id);

        let Some(arguments) = command.into_arguments() else {
            state
                .clients
                .send(id, Bytes::from(CommandError::InvalidCommand.as_string()));
            return;
        };

        let mut session = Session::new(CommandSource::Client(id), db_index);
        let reply = dispatch(state, &mut session, arguments);

        if let Some(client) = state.clients.get_mut(id) {
            client.db_index = session.db_index;
        }

        if let Some(reply) = reply {
            state.clients.send(id, Bytes::from(reply));
        }
    }

    fn on_snapshot_finished(&mut self, result: Result<Bytes, SnapshotError>) {
        let state = &mut self.state;
        let status = state.partitions.settle();

        match result {
            Ok(payload) => {
                state.last_save = now_ms() / 1000;
                state.last_bgsave_ok = true;
                info!(
                    "Background saving terminated with success, keyspace {}",
                    status.as_str()
                );
                state.master.finish_full_sync(&payload, &state.clients);
            }
            Err(e) => {
                state.last_bgsave_ok = false;
                error!("Background saving failed: {}", e);
                state.master.fail_full_sync(&state.clients);
            }
        }
    }

    fn on_replication_cron(&mut self) {
        let state = &mut self.state;

        let request = state.sync_request();
        state
            .slave
            .cron(request, state.config.repl_timeout(), &state.events);

        let settings = CronSettings {
            is_slave: state.slave.is_active(),
            ping_period: state.config.repl_ping_period(),
            timeout: state.config.repl_timeout(),
            backlog_ttl: state.config.repl_backlog_ttl(),
        };

        if state.master.cron(&state.clients, &settings)
            && state.partitions.status() == PartitionState::Normal
        {
            let _ = state.events.send(Event::SnapshotTrigger);
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        let state = &mut self.state;

        match event {
            LinkEvent::State(slave_state) => state.slave.set_state(slave_state),
            LinkEvent::Heartbeat => state.slave.touch(),
            LinkEvent::FullSync {
                replid,
                offset,
                payload,
            } => state.apply_full_sync(replid, offset, payload),
            LinkEvent::Continue { replid } => {
                if let Some(replid) = replid {
                    if replid != state.master.identity().replid {
                        let offset = state.master.offset();
                        info!("Master replid changed to {}", replid);
                        state.master.identity_mut().shift(replid, offset);
                        state.master.free_replicas(&state.clients);
                    }
                }

                state.master.ensure_backlog().activate();
                state.slave.set_state(SlaveState::Connected);
            }
            LinkEvent::Command { arguments, raw } => {
                state.slave.touch();

                if !state.slave.is_connected() {
                    return;
                }

                let mut session = Session::new(CommandSource::Master, state.slave.master_db);

                if let Some(reply) = dispatch(state, &mut session, arguments) {
                    if reply.starts_with('-') {
                        warn!("Command from master failed: {}", reply.trim_end());
                    }
                }

                state.slave.master_db = session.db_index;
                state.master.feed(&raw, None, &state.clients);
            }
            LinkEvent::Failed(reason) => {
                debug!("Master link failed: {}", reason);
                state.slave.reset_to_connect();
            }
        }
    }
}
