use std::io;
use std::time::Duration;

/// Failure of a single external command.
#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed with exit code: {code}")]
    Exit {
        command: String,
        code: i32,
        output: Vec<String>,
    },

    #[error("`{command}` was interrupted")]
    Interrupted { command: String },

    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
}

impl CommandError {
    /// The full command line that failed.
    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::Io { command, .. }
            | Self::Exit { command, .. }
            | Self::Interrupted { command }
            | Self::TimedOut { command, .. } => command,
        }
    }

    /// Name of the program that failed, without its arguments.
    pub fn program(&self) -> &str {
        self.command().split_whitespace().next().unwrap_or_default()
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Failure of a mount registration.
#[derive(thiserror::Error, Debug)]
pub enum ProvisionError {
    #[error("invalid mount request: {0}")]
    InvalidRequest(String),

    #[error("command failed: {0}")]
    Command(#[from] CommandError),
}

impl ProvisionError {
    /// Message safe to hand back to a client.
    ///
    /// Paths and command output stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidRequest(reason) => format!("Invalid mount request: {reason}"),
            Self::Command(err) => match err {
                CommandError::Exit { code, .. } => format!(
                    "Failed to register mount: {} failed with exit code: {code}",
                    err.program()
                ),
                CommandError::Interrupted { .. } => {
                    format!("Failed to register mount: {} was interrupted", err.program())
                }
                CommandError::TimedOut { .. } => {
                    format!("Failed to register mount: {} timed out", err.program())
                }
                CommandError::Spawn { .. } | CommandError::Io { .. } => {
                    format!("Failed to register mount: could not run {}", err.program())
                }
            },
        }
    }
}
