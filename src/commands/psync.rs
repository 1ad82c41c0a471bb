//! PSYNC, the request a replica sends to start or resume replication.

use tracing::info;

use crate::{
    commands::{
        command_error::CommandError, command_handler::CommandResult, command_utils::parse_integer,
    },
    executor::{CommandSource, ServerState, Session},
};

/// Represents the parsed arguments for the PSYNC command.
pub struct PsyncArguments {
    /// The replication id the replica last followed, or "?" if it has none
    replid: String,
    /// The next offset the replica expects, or -1
    offset: i64,
}

impl PsyncArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [replid, offset] = arguments.as_slice() else {
            return Err(CommandError::WrongNumberOfArguments("psync".to_string()));
        };

        Ok(Self {
            replid: replid.clone(),
            offset: parse_integer(offset)?,
        })
    }
}

/// Handles the PSYNC command.
///
/// If the replica's history is still in the backlog it gets `+CONTINUE`
/// followed by the missing bytes straight away. Otherwise it is registered
/// for a full resync and the `+FULLRESYNC` reply goes out once a snapshot is
/// ready, so this handler never replies by itself.
///
/// A slave only serves PSYNC while its own master link is up.
pub fn psync(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let psync_arguments = PsyncArguments::parse(arguments)?;

    let CommandSource::Client(id) = session.source else {
        return Ok(CommandResult::NoResponse);
    };

    if server.slave.is_active() && !server.slave.is_connected() {
        return Err(CommandError::NoMasterLink);
    }

    if server.master.is_replica(id) {
        server.master.remove_replica(id);
    }

    if server.master.try_partial_resync(
        id,
        &psync_arguments.replid,
        psync_arguments.offset,
        &server.clients,
    ) {
        return Ok(CommandResult::NoResponse);
    }

    info!(
        "Full resync requested by connection {} (replid {}, offset {})",
        id, psync_arguments.replid, psync_arguments.offset
    );

    server
        .master
        .begin_full_resync(id, psync_arguments.offset, &server.clients);
    server.schedule_full_sync();

    Ok(CommandResult::NoResponse)
}
