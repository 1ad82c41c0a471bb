//! Listener, accept loop and the background tasks that feed the executor.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{io::AsyncWriteExt, net::TcpListener, sync::Semaphore};
use tracing::{error, info, warn};

use crate::{
    config::{Config, ConfigError},
    connection::{handle_connection, ConnId},
    executor::{Event, EventSender, Executor},
    rdb::{load_snapshot_file, SnapshotError},
};

const CRON_PERIOD: Duration = Duration::from_secs(1);
const MAX_CLIENTS_REACHED: &[u8] = b"-ERR max number of clients reached\r\n";

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("cannot listen on {0}: {1}")]
    Bind(String, io::Error),
    #[error("cannot load snapshot: {0}")]
    Load(#[from] SnapshotError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A bound server whose executor already holds the data loaded from disk.
pub struct RedisServer {
    listener: TcpListener,
    executor: Executor,
    max_clients: usize,
}

impl RedisServer {
    /// Binds the listener and prepares the executor. Port 0 picks a free port.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let address = format!("{}:{}", config.bind, config.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ServerError::Bind(address.clone(), e))?;
        let port = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(address, e))?
            .port();

        let replica_of = config.replica_of()?;
        let snapshot_path = config.snapshot_path();
        let max_clients = config.maxclients;

        let mut executor = Executor::new(config);
        let state = executor.state_mut();
        state.port = port;

        if let Some(commands) = load_snapshot_file(&snapshot_path).await? {
            let count = commands.len();
            let failed = state.load_commands(commands);
            info!(
                "Loaded {} snapshot commands from {} ({} failed)",
                count,
                snapshot_path.display(),
                failed
            );
        }

        if let Some((host, port)) = replica_of {
            state.slave.set_master(host, port);
        }

        Ok(Self {
            listener,
            executor,
            max_clients,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until the process ends.
    pub async fn run(self) {
        let events = self.executor.sender();

        match self.local_addr() {
            Ok(addr) => info!("Ready to accept connections on {}", addr),
            Err(e) => warn!("Listener has no local address: {}", e),
        }

        tokio::spawn(replication_cron(events.clone()));
        tokio::spawn(self.executor.run());

        accept_loop(self.listener, events, self.max_clients).await;
    }
}

async fn replication_cron(events: EventSender) {
    let mut interval = tokio::time::interval(CRON_PERIOD);

    loop {
        interval.tick().await;

        if events.send(Event::ReplicationCron).is_err() {
            return;
        }
    }
}

async fn accept_loop(listener: TcpListener, events: EventSender, max_clients: usize) {
    let permits = Arc::new(Semaphore::new(max_clients));
    let mut next_id: ConnId = 0;

    loop {
        let (mut stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Accept failed: {}", e);
                continue;
            }
        };

        let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
            warn!("Refusing {}: max number of clients reached", addr);
            tokio::spawn(async move {
                let _ = stream.write_all(MAX_CLIENTS_REACHED).await;
            });
            continue;
        };

        next_id += 1;
        let id = next_id;
        let events = events.clone();

        tokio::spawn(async move {
            handle_connection(stream, id, addr.to_string(), events).await;
            drop(permit);
        });
    }
}
