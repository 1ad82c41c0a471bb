use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    executor::{ServerState, Session},
    resp::RespValue,
};

pub struct PingArguments {
    message: Option<String>,
}

impl PingArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() > 1 {
            return Err(CommandError::WrongNumberOfArguments("ping".to_string()));
        }

        Ok(Self {
            message: arguments.into_iter().next(),
        })
    }
}

/// Handles the PING command.
///
/// Replies `+PONG`, or echoes the optional message back as a bulk string.
/// Masters also send PING down the replication stream as a heartbeat; those
/// arrive with the master as source and their reply is dropped.
pub fn ping(
    _server: &mut ServerState,
    _session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let ping_arguments = PingArguments::parse(arguments)?;

    let reply = match ping_arguments.message {
        Some(message) => RespValue::BulkString(message),
        None => RespValue::SimpleString("PONG".to_string()),
    };

    Ok(CommandResult::Response(reply.encode()))
}
