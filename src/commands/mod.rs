mod command_dispatcher;
mod command_error;
mod command_handler;
mod command_utils;
mod debug;
mod del;
mod echo;
mod flushall;
mod get;
mod info;
mod llen;
mod lpop;
mod lrange;
mod pexpireat;
mod ping;
mod psync;
mod pub_sub;
mod replconf;
mod replicaof;
mod rpush_and_lpush;
mod save;
mod select;
mod set;

pub use command_dispatcher::{dispatch, lookup, CommandFlags, CommandSpec};
pub use command_error::CommandError;
pub use command_handler::{CommandHandler, CommandResult};
pub use pub_sub::PubSub;
