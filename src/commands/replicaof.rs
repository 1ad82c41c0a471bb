use tracing::info;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    executor::{ServerState, Session},
    replication::generate_replid,
    resp::RespValue,
};

#[derive(Debug, PartialEq)]
pub enum ReplicaofArguments {
    NoOne,
    Master { host: String, port: u16 },
}

impl ReplicaofArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [host, port] = arguments.as_slice() else {
            return Err(CommandError::WrongNumberOfArguments(
                "replicaof".to_string(),
            ));
        };

        if host.eq_ignore_ascii_case("no") && port.eq_ignore_ascii_case("one") {
            return Ok(Self::NoOne);
        }

        let port = port
            .parse::<u16>()
            .ok()
            .filter(|port| *port > 0)
            .ok_or(CommandError::InvalidMasterPort)?;

        Ok(Self::Master {
            host: host.clone(),
            port,
        })
    }
}

/// Handles REPLICAOF / SLAVEOF.
///
/// `NO ONE` turns the node back into a master. Its current history is kept as
/// the previous one so former siblings can still resume partially. Any other
/// target replaces the current master; the link is made on the next cron tick.
/// Either way the node's own replicas are dropped and must resync.
pub fn replicaof(
    server: &mut ServerState,
    _session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    match ReplicaofArguments::parse(arguments)? {
        ReplicaofArguments::NoOne => {
            if server.slave.is_active() {
                server.slave.unset_master();

                let offset = server.master.offset();
                server.master.identity_mut().shift(generate_replid(), offset);
                server.master.free_replicas(&server.clients);
                server.master.reset_stream_selector();

                info!(
                    "Master mode enabled, new replid {}",
                    server.master.identity().replid
                );
            }
        }
        ReplicaofArguments::Master { host, port } => {
            if server.slave.is_following(&host, port) {
                return Ok(CommandResult::Response(
                    RespValue::SimpleString("OK Already connected to specified master".to_string())
                        .encode(),
                ));
            }

            server.slave.set_master(host, port);
            server.master.free_replicas(&server.clients);
            server.master.reset_stream_selector();
        }
    }

    Ok(CommandResult::Response(RespValue::ok().encode()))
}
