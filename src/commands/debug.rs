//! DEBUG subcommands: test hooks and introspection into snapshot and
//! replication state.

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::CommandResult,
        command_utils::{encode_strings, parse_integer},
    },
    connection::ConnId,
    executor::{ServerState, Session},
    key_value_store::{now_ms, Value},
    resp::RespValue,
};

const HELP: &[&str] = &[
    "DEBUG <subcommand> [<arg> [value] [opt] ...]. Subcommands are:",
    "RELOAD",
    "    Save the dataset, flush it and load it back from the snapshot.",
    "POPULATE <count>",
    "    Create <count> string keys named key:<num> in the selected database.",
    "BUFFER <offset>",
    "    Return the replication backlog from <offset> onwards.",
    "WHO",
    "    Describe the replication identity of this node.",
    "SLAVE",
    "    Describe the state of the link to the master.",
    "DB",
    "    Describe the snapshot state of every database.",
    "OBJECT <key>",
    "    Show low level information about the key.",
    "ERROR <message>",
    "    Reply with <message> as an error.",
    "CLOSE <id>",
    "    Close the connection with the given id.",
    "HELP",
    "    Print this help.",
];

#[derive(Debug, PartialEq)]
pub enum DebugArguments {
    Reload,
    Populate(u64),
    Buffer(i64),
    Who,
    Slave,
    Db,
    Object(String),
    Error(String),
    Close(ConnId),
    Help,
}

impl DebugArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let Some(subcommand) = arguments.first() else {
            return Err(CommandError::WrongNumberOfArguments("debug".to_string()));
        };

        let unknown = || CommandError::UnknownSubcommand(subcommand.clone(), "DEBUG".to_string());

        let parsed = match (subcommand.to_uppercase().as_str(), &arguments[1..]) {
            ("RELOAD", []) => Self::Reload,
            ("POPULATE", [count]) => {
                let count = parse_integer(count)?;
                Self::Populate(u64::try_from(count).map_err(|_| CommandError::NotAnInteger)?)
            }
            ("BUFFER", [offset]) => Self::Buffer(parse_integer(offset)?),
            ("WHO", []) => Self::Who,
            ("SLAVE", []) => Self::Slave,
            ("DB", []) => Self::Db,
            ("OBJECT", [key]) => Self::Object(key.clone()),
            ("ERROR", [message]) => Self::Error(message.clone()),
            ("CLOSE", [id]) => Self::Close(id.parse::<ConnId>().map_err(|_| CommandError::NotAnInteger)?),
            ("HELP", []) => Self::Help,
            _ => return Err(unknown()),
        };

        Ok(parsed)
    }
}

pub fn debug_command(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let reply = match DebugArguments::parse(arguments)? {
        DebugArguments::Reload => {
            server.reload()?;
            RespValue::ok().encode()
        }
        DebugArguments::Populate(count) => {
            let partition = server.partition(session.db_index)?;

            for i in 0..count {
                partition.put(
                    format!("key:{}", i),
                    Value::String(format!("value:{}", i)),
                    None,
                );
            }

            RespValue::ok().encode()
        }
        DebugArguments::Buffer(offset) => buffer(server, offset)?,
        DebugArguments::Who => RespValue::BulkString(who(server)).encode(),
        DebugArguments::Slave => RespValue::BulkString(slave(server)).encode(),
        DebugArguments::Db => RespValue::BulkString(databases(server)).encode(),
        DebugArguments::Object(key) => object(server, session, &key)?,
        DebugArguments::Error(message) => return Err(CommandError::Custom(message)),
        DebugArguments::Close(id) => {
            if !server.clients.close(id) {
                return Err(CommandError::NoSuchClient);
            }

            RespValue::ok().encode()
        }
        DebugArguments::Help => encode_strings(HELP.iter().map(|line| line.to_string())),
    };

    Ok(CommandResult::Response(reply))
}

/// Backlog bytes from `offset`, with non-printable bytes escaped.
fn buffer(server: &ServerState, offset: i64) -> Result<String, CommandError> {
    let Some(backlog) = server.master.backlog().filter(|backlog| backlog.is_active()) else {
        return Ok(RespValue::Null.encode());
    };

    let bytes = backlog
        .read(offset)
        .map_err(|e| CommandError::Custom(format!("ERR {}", e)))?;

    Ok(RespValue::BulkString(bytes.escape_ascii().to_string()).encode())
}

fn who(server: &ServerState) -> String {
    let identity = server.master.identity();
    let role = if server.slave.is_active() {
        "slave"
    } else {
        "master"
    };

    format!(
        "role:{} replid:{} replid2:{} offset:{} second_offset:{} replicas:{}",
        role,
        identity.replid,
        identity.replid2,
        server.master.offset(),
        identity.second_offset,
        server.master.replica_count()
    )
}

fn slave(server: &ServerState) -> String {
    let master = server
        .slave
        .master()
        .map(|(host, port)| format!("{}:{}", host, port))
        .unwrap_or_else(|| "none".to_string());

    format!(
        "state:{} master:{} epoch:{} master_db:{}",
        server.slave.state().as_str(),
        master,
        server.slave.epoch(),
        server.slave.master_db
    )
}

fn databases(server: &ServerState) -> String {
    let mut lines = vec![format!("status:{}", server.partitions.status().as_str())];

    for (index, partition) in server.partitions.iter().enumerate() {
        lines.push(format!(
            "db{}:state={},keys={},primary={},shadow={},drift={}",
            index,
            partition.state().as_str(),
            partition.len(),
            partition.primary().len(),
            partition.shadow_len(),
            partition.drift()
        ));
    }

    lines.join("\n")
}

fn object(server: &mut ServerState, session: &Session, key: &str) -> Result<String, CommandError> {
    let partition = server.partition(session.db_index)?;
    let value = partition.get(key, now_ms()).ok_or(CommandError::NoSuchKey)?;

    let size = match &value {
        Value::String(s) => s.len(),
        Value::List(list) => list.len(),
    };
    let expires_at = partition
        .expiry(key)
        .map_or_else(|| "-1".to_string(), |at| at.to_string());

    Ok(RespValue::SimpleString(format!(
        "Value type:{} size:{} expires_at:{} db_state:{}",
        value.type_name(),
        size,
        expires_at,
        partition.state().as_str()
    ))
    .encode())
}
