use crate::command::{CommandRunner, SystemCommandRunner};
use crate::configuration::Configuration;
use crate::home_assistant::{DeviceIdentity, SENSORS};
use crate::metrics::Metrics;
use crate::mqtt::Session;
use crate::publisher::{MessageSink, Publisher};
use crate::recovery::DriverRecovery;
use crate::status::Availability;
use crate::ups::UpsClient;
use log::{debug, error, info, warn};
use rumqttc::AsyncClient;
use std::error::Error;
use std::future::Future;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::sleep;

/// Result of a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Values were read and this many were published
    Published(usize),

    /// The UPS answered without any known value, the device was marked offline
    NoData,

    /// The UPS could not be read and the device was marked offline.
    ///
    /// `recovered` tells the outcome of the driver restart, if one was attempted.
    Failed { recovered: Option<bool> },
}

/// Daemon that periodically polls the UPS and sends reports to MQTT
pub struct Daemon<R, S> {
    config: Configuration,
    source: UpsClient<R>,
    recovery: DriverRecovery<R>,
    publisher: Publisher<S>,
}

impl Daemon<SystemCommandRunner, AsyncClient> {
    /// Connects to the broker and polls the UPS until SIGINT or SIGTERM is received
    ///
    /// The device is marked offline before returning, whatever the reason.
    pub async fn run(config: Configuration) -> Result<(), Box<dyn Error>> {
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let shutdown = async move {
            tokio::select! {
                _ = interrupt.recv() => debug!("Ctrl-C received"),
                _ = terminate.recv() => debug!("Interrupt received"),
            }
        };

        let session = Session::connect(&config.mqtt);
        let mut daemon = Daemon::new(config, SystemCommandRunner, session.client());

        daemon.serve(shutdown).await;
        session.close().await;

        Ok(())
    }
}

impl<R, S> Daemon<R, S>
where
    R: CommandRunner + Clone,
    S: MessageSink,
{
    /// Constructs a daemon from the specified configuration
    ///
    /// ```
    /// use nut_mqtt_bridge::{Configuration, Daemon, SystemCommandRunner};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let config = Configuration::load("conf/nut-mqtt-bridge.conf").expect("Cannot load configuration");
    /// let (client, _event_loop) = rumqttc::AsyncClient::new(nut_mqtt_bridge::mqtt::options(&config.mqtt), 10);
    /// let daemon = Daemon::new(config, SystemCommandRunner, client);
    ///
    /// assert!(!daemon.publisher().discovery_published());
    /// # }
    /// ```
    pub fn new(config: Configuration, runner: R, sink: S) -> Daemon<R, S> {
        info!("Daemon for {} starting", config.ups.name);

        Daemon {
            source: UpsClient::new(runner.clone(), &config.ups),
            recovery: DriverRecovery::new(runner, &config.ups),
            publisher: Publisher::new(sink, &config.mqtt, SENSORS),
            config,
        }
    }

    pub fn publisher(&self) -> &Publisher<S> {
        &self.publisher
    }

    /// Reads the UPS once and publishes the result
    ///
    /// Errors are only returned for failures that should stop the daemon. Failing to read the
    /// UPS or to publish a message is logged and reported through the outcome.
    pub async fn poll_once(&mut self) -> Result<CycleOutcome, Box<dyn Error>> {
        let telemetry = match self.source.fetch().await {
            Ok(telemetry) => telemetry,
            Err(e) => {
                warn!("Cannot read UPS data: {e}");
                let recovered = if e.recoverable() {
                    Some(self.recovery.attempt_recovery().await)
                } else {
                    None
                };
                self.publisher
                    .publish_availability(Availability::Offline)
                    .await;
                return Ok(CycleOutcome::Failed { recovered });
            }
        };

        let metrics = Metrics::extract(&telemetry, SENSORS);
        if metrics.has_data() && !self.publisher.discovery_published() {
            let identity = DeviceIdentity::from_telemetry(&telemetry, &self.config.device);
            info!("Registering {} in Home Assistant", identity.name());
            self.publisher.publish_discovery(&identity).await?;
        }

        Ok(match self.publisher.publish_metrics(&metrics).await {
            0 if !metrics.has_data() => CycleOutcome::NoData,
            published => CycleOutcome::Published(published),
        })
    }

    /// Polls until `shutdown` completes or an unexpected error occurs, then disconnects
    pub async fn serve<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let result = self.main_loop(shutdown).await;
        self.stop(result).await;
    }

    async fn stop(&mut self, result: Result<(), Box<dyn Error>>) {
        if let Err(e) = result {
            error!("UPS polling loop failed: {e}");
        }

        self.publisher.disconnect().await;
    }

    async fn main_loop<F>(&mut self, shutdown: F) -> Result<(), Box<dyn Error>>
    where
        F: Future<Output = ()>,
    {
        let sleep_period = self.config.ups.poll_interval();
        tokio::pin!(shutdown);

        info!("Starting UPS monitoring...");
        loop {
            let outcome = self.poll_once().await?;
            debug!("Poll finished: {outcome:?}");

            tokio::select! {
                _ = sleep(sleep_period) => {},
                _ = &mut shutdown => {
                    info!("Shutting down...");
                    break;
                }
            }
        }

        Ok(())
    }
}
