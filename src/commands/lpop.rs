use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        command_utils::{encode_strings, parse_integer, write_list},
    },
    executor::{ServerState, Session},
    resp::RespValue,
};

pub struct LpopArguments {
    key: String,
    /// None pops a single element and replies with a bulk string.
    count: Option<usize>,
}

impl LpopArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        match arguments.as_slice() {
            [key] => Ok(Self {
                key: key.clone(),
                count: None,
            }),
            [key, count] => {
                let count = parse_integer(count)?;

                if count < 0 {
                    return Err(CommandError::Custom(
                        "ERR value is out of range, must be positive".to_string(),
                    ));
                }

                Ok(Self {
                    key: key.clone(),
                    count: Some(count as usize),
                })
            }
            _ => Err(CommandError::WrongNumberOfArguments("lpop".to_string())),
        }
    }
}

/// Handles the LPOP command.
///
/// Removes elements from the head of a list. Without a count the reply is the
/// single element as a bulk string, with one it is an array. A list left empty
/// is deleted.
///
/// # Returns
///
/// * Bulk string, array, or null if the key does not exist
/// * `Err(CommandError::WrongType)` - If the key holds a string
pub fn lpop(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let lpop_arguments = LpopArguments::parse(arguments)?;
    let partition = server.partition(session.db_index)?;

    let Some(list) = write_list(partition, &lpop_arguments.key)? else {
        return Ok(CommandResult::Response(RespValue::Null.encode()));
    };

    let wanted = lpop_arguments.count.unwrap_or(1).min(list.len());
    let popped: Vec<String> = list.drain(..wanted).collect();

    if list.is_empty() {
        partition.delete(&lpop_arguments.key);
    }

    let reply = match lpop_arguments.count {
        Some(_) => encode_strings(popped),
        None => match popped.into_iter().next() {
            Some(value) => RespValue::BulkString(value).encode(),
            None => RespValue::Null.encode(),
        },
    };

    Ok(CommandResult::Response(reply))
}
