use crate::{
    commands::{
        command_error::CommandError, command_handler::CommandResult, command_utils::parse_integer,
    },
    executor::{ServerState, Session},
    key_value_store::now_ms,
    resp::RespValue,
};

pub struct PexpireatArguments {
    key: String,
    /// Unix time in milliseconds
    at: i64,
}

impl PexpireatArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [key, at] = arguments.as_slice() else {
            return Err(CommandError::WrongNumberOfArguments(
                "pexpireat".to_string(),
            ));
        };

        Ok(Self {
            key: key.clone(),
            at: parse_integer(at)?,
        })
    }
}

/// Handles PEXPIREAT.
///
/// Replies 1 if the key exists and 0 otherwise. A timestamp already in the
/// past deletes the key immediately.
pub fn pexpireat(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let pexpireat_arguments = PexpireatArguments::parse(arguments)?;
    let partition = server.partition(session.db_index)?;
    let now = now_ms();

    let Some(value) = partition.get(&pexpireat_arguments.key, now) else {
        return Ok(CommandResult::Response(RespValue::Integer(0).encode()));
    };

    if pexpireat_arguments.at <= now {
        partition.delete(&pexpireat_arguments.key);
    } else {
        partition.put(
            pexpireat_arguments.key,
            value,
            Some(pexpireat_arguments.at),
        );
    }

    Ok(CommandResult::Response(RespValue::Integer(1).encode()))
}
