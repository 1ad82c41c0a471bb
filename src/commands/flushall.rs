use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    executor::{ServerState, Session},
    resp::RespValue,
};

/// Handles FLUSHALL [ASYNC|SYNC].
///
/// Empties every database. A snapshot in flight keeps writing the view it
/// froze. Both modes flush synchronously.
pub fn flushall(
    server: &mut ServerState,
    _session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    match arguments.as_slice() {
        [] => {}
        [mode] if mode.eq_ignore_ascii_case("async") || mode.eq_ignore_ascii_case("sync") => {}
        _ => return Err(CommandError::SyntaxError),
    }

    server.partitions.flush();

    Ok(CommandResult::Response(RespValue::ok().encode()))
}

pub fn dbsize(
    server: &mut ServerState,
    session: &mut Session,
    _arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let keys = server.partition(session.db_index)?.len();

    Ok(CommandResult::Response(
        RespValue::Integer(keys as i64).encode(),
    ))
}
