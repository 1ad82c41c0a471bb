use std::collections::VecDeque;

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        command_utils::{encode_strings, parse_integer, read_list},
    },
    executor::{ServerState, Session},
};

/// Represents the parsed arguments for the LRANGE command.
pub struct LrangeArguments {
    /// The key name to retrieve from the store
    key: String,
    /// The starting index for the range (can be negative to count from the end)
    start_index: i64,
    /// The ending index for the range, inclusive (can be negative to count from the end)
    end_index: i64,
}

impl LrangeArguments {
    /// Parses `key start stop`.
    ///
    /// # Returns
    ///
    /// * `Ok(LrangeArguments)` - If the arguments are valid
    /// * `Err(CommandError::WrongNumberOfArguments)` - If the number of arguments is not exactly 3
    /// * `Err(CommandError::NotAnInteger)` - If start or end index is not a valid integer
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [key, start, end] = arguments.as_slice() else {
            return Err(CommandError::WrongNumberOfArguments("lrange".to_string()));
        };

        Ok(Self {
            key: key.clone(),
            start_index: parse_integer(start)?,
            end_index: parse_integer(end)?,
        })
    }
}

/// Handles the LRANGE command.
///
/// Returns a range of elements from a list stored at the given key.
/// Both start and end indices can be negative to count from the end of the list.
/// A missing key or a range outside the list gives an empty array.
///
/// # Returns
///
/// * RESP array with the requested elements
/// * `Err(CommandError::WrongType)` - If the key holds a string
pub fn lrange(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let lrange_arguments = LrangeArguments::parse(arguments)?;
    let partition = server.partition(session.db_index)?;

    let Some(list) = read_list(partition, &lrange_arguments.key)? else {
        return Ok(CommandResult::Response(encode_strings(Vec::new())));
    };

    let range = match validate_range_indexes(
        list,
        lrange_arguments.start_index,
        lrange_arguments.end_index,
    ) {
        Ok((start, end)) => list.range(start..=end).cloned().collect(),
        Err(_) => Vec::new(),
    };

    Ok(CommandResult::Response(encode_strings(range)))
}

/// Validates and normalizes range indices for list operations.
///
/// Converts negative indices to positive equivalents and clamps the range to
/// the list. Negative indices count from the end of the list (-1 is the last
/// element).
///
/// ```text
/// // For a list of length 5:
/// // validate_range_indexes(&list, 0, 2) -> Ok((0, 2))
/// // validate_range_indexes(&list, -2, -1) -> Ok((3, 4))
/// // validate_range_indexes(&list, 5, 10) -> Err("Start index is out of bounds")
/// ```
fn validate_range_indexes(
    list: &VecDeque<String>,
    start_index: i64,
    end_index: i64,
) -> Result<(usize, usize), &'static str> {
    let len = list.len() as i64;

    if len == 0 {
        return Err("List is empty");
    }

    let start = if start_index < 0 {
        len + start_index
    } else {
        start_index
    }
    .max(0);

    let end = if end_index < 0 {
        len + end_index
    } else {
        end_index
    }
    .min(len - 1);

    if start >= len {
        return Err("Start index is out of bounds");
    }

    if start > end {
        return Err("Start index is bigger than end index after processing");
    }

    Ok((start as usize, end as usize))
}
