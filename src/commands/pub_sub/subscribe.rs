use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    connection::ConnId,
    executor::{CommandSource, ServerState, Session},
    resp::RespValue,
};

fn confirmation(kind: &str, channel: Option<String>, count: usize) -> String {
    RespValue::Array(vec![
        RespValue::BulkString(kind.to_string()),
        channel.map_or(RespValue::Null, RespValue::BulkString),
        RespValue::Integer(count as i64),
    ])
    .encode()
}

/// Handles SUBSCRIBE. Every channel gets its own confirmation with the
/// number of channels the connection is now subscribed to.
pub fn subscribe(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    if arguments.is_empty() {
        return Err(CommandError::WrongNumberOfArguments(
            "subscribe".to_string(),
        ));
    }

    let CommandSource::Client(id) = session.source else {
        return Ok(CommandResult::NoResponse);
    };

    let mut reply = String::new();

    for channel in arguments {
        server.pub_sub.subscribe(&channel, id);

        let count = match server.clients.get_mut(id) {
            Some(client) => {
                client.subscriptions.insert(channel.clone());
                client.subscriptions.len()
            }
            None => 0,
        };

        reply.push_str(&confirmation("subscribe", Some(channel), count));
    }

    Ok(CommandResult::Response(reply))
}

/// Handles UNSUBSCRIBE. Without arguments every subscription of the
/// connection is dropped.
pub fn unsubscribe(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let CommandSource::Client(id) = session.source else {
        return Ok(CommandResult::NoResponse);
    };

    let channels = if arguments.is_empty() {
        let mut current: Vec<String> = server
            .clients
            .get(id)
            .map(|client| client.subscriptions.iter().cloned().collect())
            .unwrap_or_default();
        current.sort();

        if current.is_empty() {
            return Ok(CommandResult::Response(confirmation("unsubscribe", None, 0)));
        }

        current
    } else {
        arguments
    };

    let mut reply = String::new();

    for channel in channels {
        let count = remove_subscription(server, id, &channel);
        reply.push_str(&confirmation("unsubscribe", Some(channel), count));
    }

    Ok(CommandResult::Response(reply))
}

fn remove_subscription(server: &mut ServerState, id: ConnId, channel: &str) -> usize {
    server.pub_sub.unsubscribe(channel, id);

    match server.clients.get_mut(id) {
        Some(client) => {
            client.subscriptions.remove(channel);
            client.subscriptions.len()
        }
        None => 0,
    }
}
