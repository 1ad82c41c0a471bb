use bytes::Bytes;

use crate::{
    commands::{
        command_error::CommandError, command_handler::CommandResult, command_utils::parse_integer,
    },
    executor::{CommandSource, ServerState, Session},
    resp::RespValue,
};

/// The REPLCONF options this server understands.
#[derive(Debug, PartialEq)]
pub enum ReplconfArguments {
    ListeningPort(u16),
    /// Capabilities are accepted and ignored.
    Capabilities,
    Ack(i64),
    GetAck,
}

impl ReplconfArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let Some(option) = arguments.first() else {
            return Ok(Self::Capabilities);
        };

        match option.to_lowercase().as_str() {
            "listening-port" => {
                let port = arguments
                    .get(1)
                    .ok_or(CommandError::SyntaxError)?
                    .parse::<u16>()
                    .map_err(|_| CommandError::NotAnInteger)?;

                Ok(Self::ListeningPort(port))
            }
            "capa" => Ok(Self::Capabilities),
            "ack" => {
                let offset = arguments.get(1).ok_or(CommandError::SyntaxError)?;
                Ok(Self::Ack(parse_integer(offset)?))
            }
            "getack" => Ok(Self::GetAck),
            _ => Err(CommandError::Custom(format!(
                "ERR Unrecognized REPLCONF option: {}",
                option
            ))),
        }
    }
}

/// Handles REPLCONF.
///
/// ACK is never answered. GETACK is only meaningful on the stream from our
/// master and is answered with our current offset.
pub fn replconf(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    match ReplconfArguments::parse(arguments)? {
        ReplconfArguments::ListeningPort(port) => {
            if let CommandSource::Client(id) = session.source {
                if let Some(client) = server.clients.get_mut(id) {
                    client.listening_port = Some(port);
                }
            }
        }
        ReplconfArguments::Capabilities => {}
        ReplconfArguments::Ack(offset) => {
            if let CommandSource::Client(id) = session.source {
                server.master.acknowledge(id, offset);
            }

            return Ok(CommandResult::NoResponse);
        }
        ReplconfArguments::GetAck => {
            if session.source == CommandSource::Master {
                let ack = RespValue::command(&[
                    "REPLCONF".to_string(),
                    "ACK".to_string(),
                    server.master.offset().to_string(),
                ]);
                server.slave.send_to_master(Bytes::from(ack.encode()));
            }

            return Ok(CommandResult::NoResponse);
        }
    }

    Ok(CommandResult::Response(RespValue::ok().encode()))
}
