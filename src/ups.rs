use crate::command::{CommandError, CommandRunner};
use crate::configuration::Ups;
use log::{debug, error, warn};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Variables reported by `upsc`, keyed by their dotted name (e.g. `battery.charge`)
pub type RawTelemetry = HashMap<String, String>;

/// Reasons for which a poll returned no telemetry
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("UPS query timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("UPS query failed with exit code {exit_code:?}: {stderr}")]
    CommandFailed {
        exit_code: Option<i32>,
        stderr: String,
        /// The error output matched a driver failure signature
        recoverable: bool,
    },

    #[error("UPS query could not be executed: {source}")]
    Execution {
        #[source]
        source: CommandError,
    },
}

impl FetchError {
    /// Returns `true` if restarting the driver may fix the failure
    pub fn recoverable(&self) -> bool {
        matches!(self, FetchError::CommandFailed { recoverable: true, .. })
    }
}

/// Reads the UPS variables through the NUT query tool
pub struct UpsClient<R> {
    runner: R,
    argv: Vec<String>,
    timeout: Duration,
    signatures: Vec<String>,
}

impl<R: CommandRunner> UpsClient<R> {
    pub fn new(runner: R, config: &Ups) -> Self {
        let mut argv = config.query_command.clone();
        argv.push(config.name.clone());

        UpsClient {
            runner,
            argv,
            timeout: config.query_timeout(),
            signatures: config.recovery_signatures.clone(),
        }
    }

    /// Queries the UPS once
    pub async fn fetch(&self) -> Result<RawTelemetry, FetchError> {
        let output = match self.runner.run(&self.argv, self.timeout).await {
            Ok(output) => output,
            Err(CommandError::Timeout { timeout, .. }) => {
                error!("UPS query timed out");
                return Err(FetchError::Timeout { timeout });
            }
            Err(source) => {
                error!("Error getting UPS data: {source}");
                return Err(FetchError::Execution { source });
            }
        };

        if !output.success() {
            let stderr = output.stderr.trim().to_string();
            error!("UPS query failed: {stderr}");
            let recoverable = self.is_driver_failure(&stderr);
            if recoverable {
                warn!("Detected NUT driver issue, a restart is needed");
            }
            return Err(FetchError::CommandFailed {
                exit_code: output.exit_code,
                stderr,
                recoverable,
            });
        }

        let telemetry = parse_telemetry(&output.stdout);
        debug!("Read {} UPS variables", telemetry.len());
        Ok(telemetry)
    }

    fn is_driver_failure(&self, stderr: &str) -> bool {
        self.signatures
            .iter()
            .any(|signature| !signature.is_empty() && stderr.contains(signature.as_str()))
    }
}

/// Parses `key: value` lines. Lines without a colon are ignored and the last duplicate wins.
pub fn parse_telemetry(text: &str) -> RawTelemetry {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}
