use thiserror::Error;

use crate::resp::RespValue;

/// Every error a command can reply with. The display text is the reply itself.
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongNumberOfArguments(String),
    #[error("ERR invalid command format")]
    InvalidCommand,
    #[error("ERR syntax error")]
    SyntaxError,
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
    #[error("ERR DB index is out of range")]
    DbIndexOutOfRange,
    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),
    #[error("READONLY You can't write against a read only replica.")]
    ReadOnlyReplica,
    #[error("ERR can not save in bgsave")]
    SaveInProgress,
    #[error("ERR in save")]
    SaveFailed,
    #[error("ERR error loading the snapshot: {0}")]
    LoadFailed(String),
    #[error("ERR Unknown subcommand or wrong number of arguments for '{0}'. Try {1} HELP.")]
    UnknownSubcommand(String, String),
    #[error("ERR no such key")]
    NoSuchKey,
    #[error("ERR No such client")]
    NoSuchClient,
    #[error("ERR Invalid master port")]
    InvalidMasterPort,
    #[error("NOMASTERLINK Can't SYNC while not connected with my master")]
    NoMasterLink,
    #[error("{0}")]
    Custom(String),
}

impl CommandError {
    pub fn as_string(&self) -> String {
        RespValue::Error(self.to_string()).encode()
    }
}
