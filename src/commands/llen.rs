use crate::{
    commands::{
        command_error::CommandError, command_handler::CommandResult, command_utils::read_list,
    },
    executor::{ServerState, Session},
    resp::RespValue,
};

/// Handles LLEN. A missing key has length 0.
pub fn llen(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let [key] = arguments.as_slice() else {
        return Err(CommandError::WrongNumberOfArguments("llen".to_string()));
    };

    let partition = server.partition(session.db_index)?;
    let length = read_list(partition, key)?.map_or(0, |list| list.len());

    Ok(CommandResult::Response(
        RespValue::Integer(length as i64).encode(),
    ))
}
