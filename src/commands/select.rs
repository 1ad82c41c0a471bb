use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    executor::{ServerState, Session},
    resp::RespValue,
};

pub struct SelectArguments {
    index: i64,
}

impl SelectArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 1 {
            return Err(CommandError::WrongNumberOfArguments("select".to_string()));
        }

        let index = arguments[0]
            .parse::<i64>()
            .map_err(|_| CommandError::NotAnInteger)?;

        Ok(Self { index })
    }
}

/// Switches the session to another partition.
pub fn select(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let select_arguments = SelectArguments::parse(arguments)?;

    let index = usize::try_from(select_arguments.index)
        .ok()
        .filter(|index| *index < server.partitions.len())
        .ok_or(CommandError::DbIndexOutOfRange)?;

    session.db_index = index;

    Ok(CommandResult::Response(RespValue::ok().encode()))
}
