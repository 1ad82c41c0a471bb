use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    executor::{ServerState, Session},
    resp::RespValue,
};

/// Handles the ECHO command.
///
/// # Examples
///
/// ```ignore
/// // ECHO "hello world"
/// // Returns: "$11\r\nhello world\r\n"
/// ```
pub fn echo(
    _server: &mut ServerState,
    _session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let Some(message) = arguments.into_iter().next() else {
        return Err(CommandError::WrongNumberOfArguments("echo".to_string()));
    };

    Ok(CommandResult::Response(RespValue::BulkString(message).encode()))
}
