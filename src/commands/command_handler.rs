use crate::commands::command_error::CommandError;

/// What a command hands back to the executor.
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Nothing is written back, either because the command replies on its own
    /// schedule (PSYNC) or because the protocol expects silence (REPLCONF ACK).
    NoResponse,
    /// RESP-encoded reply.
    Response(String),
}

/// A command split into its upper-cased name and its arguments.
#[derive(Debug, PartialEq, Clone)]
pub struct CommandHandler {
    pub name: String,
    pub arguments: Vec<String>,
}

impl CommandHandler {
    pub fn new(mut input: Vec<String>) -> Result<Self, CommandError> {
        if input.is_empty() {
            return Err(CommandError::InvalidCommand);
        }

        let name = input.remove(0).to_uppercase();

        Ok(Self {
            name,
            arguments: input,
        })
    }

    /// The full command, name first, as it would be sent on the wire.
    pub fn to_vec(&self) -> Vec<String> {
        let mut command = Vec::with_capacity(self.arguments.len() + 1);
        command.push(self.name.clone());
        command.extend(self.arguments.iter().cloned());
        command
    }
}
