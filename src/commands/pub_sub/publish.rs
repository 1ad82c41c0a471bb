use bytes::Bytes;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    executor::{ServerState, Session},
    resp::RespValue,
};

pub struct PublishArguments {
    pub channel: String,
    pub message: String,
}

impl PublishArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [channel, message] = arguments.as_slice() else {
            return Err(CommandError::WrongNumberOfArguments("publish".to_string()));
        };

        Ok(Self {
            channel: channel.clone(),
            message: message.clone(),
        })
    }
}

/// Sends the message to every subscriber and replies with how many got it.
pub fn publish(
    server: &mut ServerState,
    _session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let publish_arguments = PublishArguments::parse(arguments)?;

    let message = Bytes::from(
        RespValue::Array(vec![
            RespValue::BulkString("message".to_string()),
            RespValue::BulkString(publish_arguments.channel.clone()),
            RespValue::BulkString(publish_arguments.message),
        ])
        .encode(),
    );

    let count = server
        .pub_sub
        .subscribers(&publish_arguments.channel)
        .filter(|id| server.clients.send(*id, message.clone()))
        .count();

    Ok(CommandResult::Response(
        RespValue::Integer(count as i64).encode(),
    ))
}
