use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    executor::{ServerState, Session},
    resp::RespValue,
};

/// Handles SAVE. Blocks the executor until the snapshot is on disk.
pub fn save(
    server: &mut ServerState,
    _session: &mut Session,
    _arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    server.save()?;

    Ok(CommandResult::Response(RespValue::ok().encode()))
}

/// Handles BGSAVE [SCHEDULE]. The snapshot is written on a blocking thread.
pub fn bgsave(
    server: &mut ServerState,
    _session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    match arguments.as_slice() {
        [] => {}
        [option] if option.eq_ignore_ascii_case("schedule") => {}
        _ => return Err(CommandError::SyntaxError),
    }

    server.start_background_save()?;

    Ok(CommandResult::Response(
        RespValue::SimpleString("Background saving started".to_string()).encode(),
    ))
}
