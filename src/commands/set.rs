use crate::{
    commands::{
        command_error::CommandError, command_handler::CommandResult, command_utils::parse_integer,
    },
    executor::{ServerState, Session},
    key_value_store::{now_ms, Value},
    resp::RespValue,
};

/// Represents the parsed arguments for SET command
#[derive(Debug, PartialEq)]
pub struct SetArguments {
    /// The key to store the value under
    key: String,
    value: String,
    /// Absolute expiry in unix milliseconds
    expires_at: Option<i64>,
    /// Whether the expiry was given relative to now
    relative: bool,
}

impl SetArguments {
    /// Parses `key value [PX milliseconds | PXAT unix-time-milliseconds]`.
    ///
    /// A relative PX expiry is turned into an absolute timestamp right away so
    /// the same instant can be replicated.
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let mut arguments = arguments.into_iter();

        let (Some(key), Some(value)) = (arguments.next(), arguments.next()) else {
            return Err(CommandError::WrongNumberOfArguments("set".to_string()));
        };

        let mut expires_at = None;
        let mut relative = false;

        while let Some(option) = arguments.next() {
            if expires_at.is_some() {
                return Err(CommandError::SyntaxError);
            }

            let option = option.to_uppercase();
            let Some(amount) = arguments.next() else {
                return Err(CommandError::SyntaxError);
            };
            let amount = parse_integer(&amount)?;

            if amount <= 0 {
                return Err(CommandError::InvalidExpireTime("set".to_string()));
            }

            match option.as_str() {
                "PX" => {
                    expires_at = Some(now_ms().saturating_add(amount));
                    relative = true;
                }
                "PXAT" => expires_at = Some(amount),
                _ => return Err(CommandError::SyntaxError),
            }
        }

        Ok(Self {
            key,
            value,
            expires_at,
            relative,
        })
    }
}

/// Handles the SET command.
///
/// Stores a string, replacing whatever the key held and its expiry. A PX
/// expiry is propagated as PXAT so replicas expire the key at the same time.
pub fn set(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let set_arguments = SetArguments::parse(arguments)?;

    if set_arguments.relative {
        if let Some(at) = set_arguments.expires_at {
            session.propagate_as = Some(vec![
                "SET".to_string(),
                set_arguments.key.clone(),
                set_arguments.value.clone(),
                "PXAT".to_string(),
                at.to_string(),
            ]);
        }
    }

    server.partition(session.db_index)?.put(
        set_arguments.key,
        Value::String(set_arguments.value),
        set_arguments.expires_at,
    );

    Ok(CommandResult::Response(RespValue::ok().encode()))
}

/// Handles MSET. Every key loses its expiry.
pub fn mset(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    if arguments.is_empty() || arguments.len() % 2 != 0 {
        return Err(CommandError::WrongNumberOfArguments("mset".to_string()));
    }

    let partition = server.partition(session.db_index)?;
    let mut arguments = arguments.into_iter();

    while let (Some(key), Some(value)) = (arguments.next(), arguments.next()) {
        partition.put(key, Value::String(value), None);
    }

    Ok(CommandResult::Response(RespValue::ok().encode()))
}
