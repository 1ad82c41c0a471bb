use std::collections::VecDeque;

use crate::{
    commands::command_error::CommandError,
    key_value_store::{now_ms, Value},
    resp::RespValue,
    store::Partition,
};

pub fn parse_integer(value: &str) -> Result<i64, CommandError> {
    value.parse::<i64>().map_err(|_| CommandError::NotAnInteger)
}

/// Reads a string key. Missing and expired keys are `None`.
pub fn read_string(partition: &mut Partition, key: &str) -> Result<Option<String>, CommandError> {
    match partition.get(key, now_ms()) {
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::List(_)) => Err(CommandError::WrongType),
        None => Ok(None),
    }
}

/// Borrows a list key for reading. Missing and expired keys are `None`.
pub fn read_list<'a>(
    partition: &'a mut Partition,
    key: &str,
) -> Result<Option<&'a VecDeque<String>>, CommandError> {
    match partition.get_ref(key, now_ms()) {
        Some(Value::List(list)) => Ok(Some(list)),
        Some(Value::String(_)) => Err(CommandError::WrongType),
        None => Ok(None),
    }
}

/// Borrows a list key for changing it in place, expiry kept.
pub fn write_list<'a>(
    partition: &'a mut Partition,
    key: &str,
) -> Result<Option<&'a mut VecDeque<String>>, CommandError> {
    match partition.get_mut(key, now_ms()) {
        Some(Value::List(list)) => Ok(Some(list)),
        Some(Value::String(_)) => Err(CommandError::WrongType),
        None => Ok(None),
    }
}

pub fn encode_strings<I>(items: I) -> String
where
    I: IntoIterator<Item = String>,
{
    RespValue::Array(items.into_iter().map(RespValue::BulkString).collect()).encode()
}
