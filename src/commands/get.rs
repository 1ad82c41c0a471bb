use crate::{
    commands::{
        command_error::CommandError, command_handler::CommandResult, command_utils::read_string,
    },
    executor::{ServerState, Session},
    key_value_store::{now_ms, Value},
    resp::RespValue,
};

/// Handles the GET command.
///
/// Reads go through the partition, so during a snapshot a value written
/// after the freeze is returned even though the snapshot still holds the
/// older one. An expired key is reaped on access and reads as null.
///
/// # Returns
///
/// * Bulk string with the value, or null if the key does not exist
/// * `Err(CommandError::WrongType)` - If the key holds a list
pub fn get(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let [key] = arguments.as_slice() else {
        return Err(CommandError::WrongNumberOfArguments("get".to_string()));
    };

    let partition = server.partition(session.db_index)?;

    let reply = match read_string(partition, key)? {
        Some(value) => RespValue::BulkString(value),
        None => RespValue::Null,
    };

    Ok(CommandResult::Response(reply.encode()))
}

/// Handles MGET. Keys that are missing or hold a list read as null.
pub fn mget(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let partition = server.partition(session.db_index)?;
    let now = now_ms();

    let values = arguments
        .iter()
        .map(|key| match partition.get(key, now) {
            Some(Value::String(value)) => RespValue::BulkString(value),
            _ => RespValue::Null,
        })
        .collect();

    Ok(CommandResult::Response(RespValue::Array(values).encode()))
}
