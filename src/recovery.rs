use crate::command::CommandRunner;
use crate::configuration::Ups;
use log::{error, info, warn};
use std::time::Duration;
use tokio::time::sleep;

/// Restarts the NUT driver when it stops reporting fresh data
pub struct DriverRecovery<R> {
    runner: R,
    driver_command: Vec<String>,
    timeout: Duration,
    settle_delay: Duration,
    warmup_delay: Duration,
}

impl<R: CommandRunner> DriverRecovery<R> {
    pub fn new(runner: R, config: &Ups) -> Self {
        DriverRecovery {
            runner,
            driver_command: config.driver_command.clone(),
            timeout: config.driver_timeout(),
            settle_delay: config.settle_delay(),
            warmup_delay: config.warmup_delay(),
        }
    }

    fn argv(&self, action: &str) -> Vec<String> {
        let mut argv = self.driver_command.clone();
        argv.push(action.to_string());
        argv
    }

    /// Stops then starts the driver.
    ///
    /// Returns `true` once the driver has been started and given time to warm up. Stopping a
    /// driver that is not running is not an error, so this is safe to call on a healthy driver.
    pub async fn attempt_recovery(&self) -> bool {
        warn!("Attempting to restart NUT driver...");

        match self.runner.run(&self.argv("stop"), self.timeout).await {
            Ok(output) if !output.success() => {
                info!("Driver stop exited with {:?}: {}", output.exit_code, output.stderr.trim())
            }
            Ok(_) => {}
            Err(e) => warn!("Driver stop failed: {e}"),
        }

        sleep(self.settle_delay).await;

        match self.runner.run(&self.argv("start"), self.timeout).await {
            Ok(output) if output.success() => {
                info!("NUT driver restarted successfully");
                sleep(self.warmup_delay).await;
                true
            }
            Ok(output) => {
                error!("Failed to restart NUT driver: {}", output.stderr.trim());
                false
            }
            Err(e) => {
                error!("Error restarting NUT driver: {e}");
                false
            }
        }
    }
}
