use std::{collections::HashMap, sync::OnceLock};

use tracing::debug;

use crate::{
    commands::{
        command_error::CommandError,
        command_handler::{CommandHandler, CommandResult},
        debug::debug_command,
        del::{del, exists},
        echo::echo,
        flushall::{dbsize, flushall},
        get::{get, mget},
        info::info,
        llen::llen,
        lpop::lpop,
        lrange::lrange,
        pexpireat::pexpireat,
        ping::ping,
        psync::psync,
        pub_sub::{publish, subscribe, unsubscribe},
        replconf::replconf,
        replicaof::replicaof,
        rpush_and_lpush::{lpush, lpushx, rpush, rpushx},
        save::{bgsave, save},
        select::select,
        set::{mset, set},
    },
    executor::{CommandSource, ServerState, Session},
    resp::RespValue,
};

pub type CommandFn =
    fn(&mut ServerState, &mut Session, Vec<String>) -> Result<CommandResult, CommandError>;

/// Attribute bits of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFlags(u8);

impl CommandFlags {
    pub const WRITE: CommandFlags = CommandFlags(1);
    pub const READONLY: CommandFlags = CommandFlags(1 << 1);
    pub const ADMIN: CommandFlags = CommandFlags(1 << 2);
    /// Successful calls are appended to the replication stream.
    pub const PROPAGATE: CommandFlags = CommandFlags(1 << 3);

    pub const fn union(self, other: CommandFlags) -> CommandFlags {
        CommandFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: CommandFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

const WRITE: CommandFlags = CommandFlags::WRITE.union(CommandFlags::PROPAGATE);
const READONLY: CommandFlags = CommandFlags::READONLY;
const ADMIN: CommandFlags = CommandFlags::ADMIN;

pub struct CommandSpec {
    pub name: &'static str,
    /// Argument count including the name. Negative means "at least".
    pub arity: i32,
    pub flags: CommandFlags,
    pub handler: CommandFn,
}

impl CommandSpec {
    fn accepts_arity(&self, count: usize) -> bool {
        let count = count as i32;

        if self.arity >= 0 {
            count == self.arity
        } else {
            count >= -self.arity
        }
    }
}

macro_rules! command {
    ($name:literal, $arity:expr, $flags:expr, $handler:expr) => {
        CommandSpec {
            name: $name,
            arity: $arity,
            flags: $flags,
            handler: $handler,
        }
    };
}

static COMMANDS: &[CommandSpec] = &[
    command!("PING", -1, READONLY, ping),
    command!("ECHO", 2, READONLY, echo),
    command!("SELECT", 2, READONLY, select),
    command!("GET", 2, READONLY, get),
    command!("MGET", -2, READONLY, mget),
    command!("SET", -3, WRITE, set),
    command!("MSET", -3, WRITE, mset),
    command!("DEL", -2, WRITE, del),
    command!("EXISTS", -2, READONLY, exists),
    command!("DBSIZE", 1, READONLY, dbsize),
    command!("PEXPIREAT", 3, WRITE, pexpireat),
    command!("FLUSHALL", -1, WRITE, flushall),
    command!("LPUSH", -3, WRITE, lpush),
    command!("RPUSH", -3, WRITE, rpush),
    command!("LPUSHX", -3, WRITE, lpushx),
    command!("RPUSHX", -3, WRITE, rpushx),
    command!("LRANGE", 4, READONLY, lrange),
    command!("LLEN", 2, READONLY, llen),
    command!("LPOP", -2, WRITE, lpop),
    command!("SAVE", 1, ADMIN, save),
    command!("BGSAVE", -1, ADMIN, bgsave),
    command!("INFO", -1, READONLY, info),
    command!("REPLICAOF", 3, ADMIN, replicaof),
    command!("SLAVEOF", 3, ADMIN, replicaof),
    command!("REPLCONF", -1, ADMIN, replconf),
    command!("PSYNC", 3, ADMIN, psync),
    command!("DEBUG", -2, ADMIN, debug_command),
    command!("PUBLISH", 3, CommandFlags::PROPAGATE, publish),
    command!("SUBSCRIBE", -2, READONLY, subscribe),
    command!("UNSUBSCRIBE", -1, READONLY, unsubscribe),
];

fn table() -> &'static HashMap<&'static str, &'static CommandSpec> {
    static TABLE: OnceLock<HashMap<&'static str, &'static CommandSpec>> = OnceLock::new();

    TABLE.get_or_init(|| COMMANDS.iter().map(|spec| (spec.name, spec)).collect())
}

/// Looks a command up by name, in any case.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    table().get(name.to_uppercase().as_str()).copied()
}

/// Validates and runs one command, returning the encoded reply if there is one.
///
/// Write commands from clients are refused while this node replicates from a
/// master. On a master, a successful command with the propagate attribute
/// issued by a client is appended to the replication stream, in the form the
/// handler left in `session.propagate_as` if it rewrote itself. A slave's
/// stream only ever carries what its own master sent.
pub fn dispatch(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Option<String> {
    match run(server, session, arguments) {
        Ok(CommandResult::Response(reply)) => Some(reply),
        Ok(CommandResult::NoResponse) => None,
        Err(e) => {
            debug!("Command failed: {}", e);
            Some(e.as_string())
        }
    }
}

fn run(
    server: &mut ServerState,
    session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let Some(first) = arguments.first() else {
        return Ok(CommandResult::NoResponse);
    };

    let spec = lookup(first).ok_or_else(|| CommandError::UnknownCommand(first.clone()))?;

    if !spec.accepts_arity(arguments.len()) {
        return Err(CommandError::WrongNumberOfArguments(first.to_lowercase()));
    }

    let from_client = matches!(session.source, CommandSource::Client(_));

    if from_client && server.slave.is_active() && spec.flags.contains(CommandFlags::WRITE) {
        return Err(CommandError::ReadOnlyReplica);
    }

    let command = CommandHandler::new(arguments)?;
    session.propagate_as = None;

    let result = (spec.handler)(server, session, command.arguments.clone())?;

    let is_master = !server.slave.is_active();

    if from_client && is_master && spec.flags.contains(CommandFlags::PROPAGATE) {
        let propagated = session
            .propagate_as
            .take()
            .unwrap_or_else(|| command.to_vec());

        server.master.feed(
            RespValue::command(&propagated).encode().as_bytes(),
            Some(session.db_index),
            &server.clients,
        );
    }

    Ok(result)
}
