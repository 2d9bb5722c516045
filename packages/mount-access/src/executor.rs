//! External command execution.
//!
//! Provisioning shells out to `mkdir`, `chown` and `chmod`. This module wraps
//! that behind a trait so tests can record the issued commands instead of
//! touching real ownership.

use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};

use crate::error::CommandError;

/// Merged stdout/stderr of a successful command, one entry per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub lines: Vec<String>,
}

/// Trait for running external commands.
///
/// Implementations either spawn real processes or record the argv for tests.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `argv[0]` with the remaining arguments and wait for it to exit.
    ///
    /// Returns `Err` when the process cannot be started, exits non-zero,
    /// is interrupted, or outlives the configured timeout.
    async fn run(&self, argv: &[String]) -> Result<CommandOutput, CommandError>;
}

/// Production executor that spawns OS processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    /// Executor that waits for every command, however long it takes.
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Executor that gives up on a command after `timeout`.
    ///
    /// The deadline covers both the exit and the end of output, so a
    /// background process still holding the output pipe counts as running.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput, CommandError> {
        let command_line = argv.join(" ");
        let Some((program, args)) = argv.split_first() else {
            return Err(CommandError::Spawn {
                command: command_line,
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let io_error = |source| CommandError::Io {
            command: command_line.clone(),
            source,
        };

        // stdout and stderr share one pipe so lines keep their relative order.
        let (reader, writer) = io::pipe().map_err(io_error)?;
        let stderr_writer = writer.try_clone().map_err(io_error)?;
        let reader = pipe::Receiver::from_file(File::from(OwnedFd::from(reader)))
            .map_err(io_error)?;

        // The Command holds our copies of the write end; it has to be dropped
        // before reading or the reader never sees EOF.
        let mut child = {
            let mut command = Command::new(program);
            command
                .args(args)
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(stderr_writer)
                .kill_on_drop(true);
            command.spawn().map_err(|source| CommandError::Spawn {
                command: command_line.clone(),
                source,
            })?
        };

        tracing::debug!(command = %command_line, pid = ?child.id(), "spawned command");

        let (status, lines) = match self.timeout {
            None => collect(&mut child, reader, &command_line).await?,
            Some(timeout) => {
                match tokio::time::timeout(timeout, collect(&mut child, reader, &command_line))
                    .await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        tracing::warn!(
                            command = %command_line,
                            timeout_ms = timeout.as_millis() as u64,
                            "command timed out, killing it"
                        );
                        let _ = child.kill().await;
                        return Err(CommandError::TimedOut {
                            command: command_line,
                            timeout,
                        });
                    }
                }
            }
        };

        finish(command_line, status, lines)
    }
}

/// Read the merged output to EOF, then reap the child.
async fn collect(
    child: &mut Child,
    reader: pipe::Receiver,
    command: &str,
) -> Result<(ExitStatus, Vec<String>), CommandError> {
    let lines = read_lines(reader, command).await;
    let status = child
        .wait()
        .await
        .map_err(|source| wait_error(command, source))?;
    Ok((status, lines))
}

async fn read_lines(reader: pipe::Receiver, command: &str) -> Vec<String> {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                tracing::debug!(command, "command output: {}", line);
                lines.push(line);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(command, error = %err, "failed to read command output");
                break;
            }
        }
    }

    lines
}

fn wait_error(command: &str, source: io::Error) -> CommandError {
    if source.kind() == io::ErrorKind::Interrupted {
        CommandError::Interrupted {
            command: command.to_string(),
        }
    } else {
        CommandError::Io {
            command: command.to_string(),
            source,
        }
    }
}

fn finish(
    command: String,
    status: ExitStatus,
    lines: Vec<String>,
) -> Result<CommandOutput, CommandError> {
    match status.code() {
        Some(0) => Ok(CommandOutput { lines }),
        Some(code) => Err(CommandError::Exit {
            command,
            code,
            output: lines,
        }),
        // Terminated by a signal.
        None => Err(CommandError::Interrupted { command }),
    }
}

/// Mock command executor for testing.
///
/// Records every argv and fails the commands it has been told to fail.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command lines, in call order.
        recorded: Arc<Mutex<Vec<Vec<String>>>>,
        /// Exit codes keyed by full command line.
        failures: Arc<Mutex<HashMap<String, i32>>>,
        /// Whether `mkdir -p` creates the directory for real.
        create_dirs: bool,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make `mkdir -p <path>` actually create `<path>`.
        pub fn creating_dirs(mut self) -> Self {
            self.create_dirs = true;
            self
        }

        /// Fail the given command line with `code`.
        pub fn fail_command(self, command_line: impl Into<String>, code: i32) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(command_line.into(), code);
            self
        }

        pub fn recorded(&self) -> Vec<Vec<String>> {
            self.recorded.lock().unwrap().clone()
        }

        /// Recorded commands joined into single lines.
        pub fn recorded_lines(&self) -> Vec<String> {
            self.recorded().iter().map(|argv| argv.join(" ")).collect()
        }
    }

    #[async_trait]
    impl CommandExecutor for MockExecutor {
        async fn run(&self, argv: &[String]) -> Result<CommandOutput, CommandError> {
            self.recorded.lock().unwrap().push(argv.to_vec());

            let command_line = argv.join(" ");
            if let Some(code) = self.failures.lock().unwrap().get(&command_line) {
                return Err(CommandError::Exit {
                    command: command_line,
                    code: *code,
                    output: vec!["mock failure".to_string()],
                });
            }

            if self.create_dirs {
                if let [program, flag, path] = argv {
                    if program == "mkdir" && flag == "-p" {
                        std::fs::create_dir_all(Path::new(path)).map_err(|source| {
                            CommandError::Io {
                                command: command_line.clone(),
                                source,
                            }
                        })?;
                    }
                }
            }

            Ok(CommandOutput::default())
        }
    }
}
