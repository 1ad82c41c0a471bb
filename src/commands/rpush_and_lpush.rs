use std::collections::VecDeque;

use crate::{
    commands::{
        command_error::CommandError, command_handler::CommandResult, command_utils::write_list,
    },
    executor::{ServerState, Session},
    key_value_store::Value,
    resp::RespValue,
};

pub struct PushArguments {
    key: String,
    values: Vec<String>,
}

impl PushArguments {
    pub fn parse(arguments: Vec<String>, command: &str) -> Result<Self, CommandError> {
        if arguments.len() < 2 {
            return Err(CommandError::WrongNumberOfArguments(command.to_string()));
        }

        let mut arguments = arguments.into_iter();
        let key = arguments.next().unwrap_or_default();

        Ok(Self {
            key,
            values: arguments.collect(),
        })
    }
}

#[derive(Clone, Copy)]
enum End {
    Head,
    Tail,
}

pub fn rpush(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    push(server, session, arguments, "rpush", End::Tail, false)
}

pub fn lpush(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    push(server, session, arguments, "lpush", End::Head, false)
}

/// Like RPUSH but only when the list already exists.
pub fn rpushx(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    push(server, session, arguments, "rpushx", End::Tail, true)
}

/// Like LPUSH but only when the list already exists.
pub fn lpushx(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    push(server, session, arguments, "lpushx", End::Head, true)
}

/// Pushes every value in order and replies with the new length.
///
/// An existing list is changed in place through the partition, so a push
/// during a snapshot lands in the shadow store.
fn push(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
    command: &str,
    end: End,
    only_existing: bool,
) -> Result<CommandResult, CommandError> {
    let push_arguments = PushArguments::parse(arguments, command)?;
    let partition = server.partition(session.db_index)?;

    let length = match write_list(partition, &push_arguments.key)? {
        Some(list) => {
            add_values_to_list(list, push_arguments.values, end);
            list.len()
        }
        None if only_existing => 0,
        None => {
            let mut list = VecDeque::new();
            add_values_to_list(&mut list, push_arguments.values, end);
            let length = list.len();

            partition.put(push_arguments.key, Value::List(list), None);
            length
        }
    };

    Ok(CommandResult::Response(
        RespValue::Integer(length as i64).encode(),
    ))
}

fn add_values_to_list(list: &mut VecDeque<String>, values: Vec<String>, end: End) {
    for value in values {
        match end {
            End::Head => list.push_front(value),
            End::Tail => list.push_back(value),
        }
    }
}
