use crate::configuration::Mqtt;
use crate::status::Availability;
use log::{debug, info, trace, warn};
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// Capacity of the queue between the client handles and the network task
const REQUEST_CAPACITY: usize = 64;

/// Delay before polling the event loop again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Longest wait for queued messages to be flushed on shutdown
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds the connection options. The broker publishes `offline` on the availability topic
/// if the bridge disappears without disconnecting.
pub fn options(config: &Mqtt) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive));
    if !config.user.is_empty() {
        options.set_credentials(&config.user, &config.password);
    }
    options.set_last_will(LastWill::new(
        config.availability_topic(),
        Availability::Offline.as_str(),
        config.qos(),
        true,
    ));
    options
}

/// MQTT session: the client handle and the task driving the network
pub struct Session {
    client: AsyncClient,
    network: JoinHandle<()>,
}

impl Session {
    /// Starts the session. The connection is established in the background and retried
    /// until it succeeds; every successful connection marks the device online.
    pub fn connect(config: &Mqtt) -> Session {
        info!("Connecting to MQTT broker {}:{}", config.host, config.port);

        let (client, event_loop) = AsyncClient::new(options(config), REQUEST_CAPACITY);
        let network = tokio::spawn(drive(
            event_loop,
            client.clone(),
            config.availability_topic(),
            config.qos(),
        ));

        Session { client, network }
    }

    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Waits for the network task to send the queued messages and the disconnection
    pub async fn close(self) {
        let mut network = self.network;
        if timeout(FLUSH_TIMEOUT, &mut network).await.is_err() {
            warn!("MQTT connection did not close in time");
            network.abort();
        }
    }
}

async fn drive(
    mut event_loop: EventLoop,
    client: AsyncClient,
    availability_topic: String,
    qos: rumqttc::QoS,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("Connected to MQTT broker: {:?}", ack.code);
                // Cannot await here: the queue is only drained by this loop
                if let Err(e) = client.try_publish(
                    &availability_topic,
                    qos,
                    true,
                    Availability::Online.as_str(),
                ) {
                    warn!("Cannot publish availability: {e}");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnection sent");
                break;
            }
            Ok(notification) => trace!("MQTT notification received: {notification:?}"),
            Err(e) => {
                warn!("MQTT connection error: {e}");
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
