use async_trait::async_trait;
use log::trace;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Captured result of an external command that ran to completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` if the command exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Reasons for which an external command did not run to completion
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("No command to run")]
    EmptyCommand,

    #[error("Command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Command '{command}' could not be started: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs external commands. The bridge only talks to NUT through this trait.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `argv` (program followed by its arguments) and waits at most `timeout` for it to exit
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as child processes of the bridge
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput, CommandError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(CommandError::EmptyCommand);
        };
        let command = argv.join(" ");
        trace!("Running {command}");

        // The child is killed when the timeout drops the future
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout, output).await {
            Err(_) => Err(CommandError::Timeout { command, timeout }),
            Ok(Err(source)) => Err(CommandError::Spawn { command, source }),
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
        }
    }
}
