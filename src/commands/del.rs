use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    executor::{ServerState, Session},
    key_value_store::now_ms,
    resp::RespValue,
};

/// Handles DEL. Replies with the number of keys that existed and were removed.
pub fn del(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let partition = server.partition(session.db_index)?;
    let now = now_ms();
    let mut removed = 0;

    for key in &arguments {
        // An expired key is reaped by the lookup and does not count.
        if partition.contains(key, now) && partition.delete(key) {
            removed += 1;
        }
    }

    Ok(CommandResult::Response(RespValue::Integer(removed).encode()))
}

/// Handles EXISTS. A key named twice is counted twice.
pub fn exists(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let partition = server.partition(session.db_index)?;
    let now = now_ms();

    let found = arguments
        .iter()
        .filter(|key| partition.contains(key, now))
        .count();

    Ok(CommandResult::Response(
        RespValue::Integer(found as i64).encode(),
    ))
}
