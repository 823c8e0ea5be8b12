use crate::configuration::Mqtt;
use crate::home_assistant::{DeviceIdentity, DiscoveryConfig, RUNTIME_KEY, SensorDefinition};
use crate::metrics::{Metrics, format_runtime};
use crate::status::Availability;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, ClientError, QoS};
use std::error::Error;

/// Destination of the published messages
#[async_trait]
pub trait MessageSink: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    /// Queues a message without waiting for room or for delivery
    async fn publish(
        &self,
        topic: &str,
        payload: String,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error>;

    /// Closes the session once the queued messages are sent
    async fn disconnect(&self) -> Result<(), Self::Error>;
}

/// The request queue is never awaited: while the broker is unreachable it is not drained,
/// and a full queue drops the message with `ClientError::TryRequest`.
#[async_trait]
impl MessageSink for AsyncClient {
    type Error = ClientError;

    async fn publish(
        &self,
        topic: &str,
        payload: String,
        qos: QoS,
        retain: bool,
    ) -> Result<(), ClientError> {
        self.try_publish(topic, qos, retain, payload)
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.try_disconnect()
    }
}

/// Publishes the UPS state to Home Assistant.
///
/// Every message is retained so that late subscribers get the last known state.
pub struct Publisher<S> {
    sink: S,
    sensors: &'static [SensorDefinition],
    qos: QoS,
    topic_base: String,
    discovery_prefix: String,
    availability_topic: String,

    discovery_published: bool,
    availability: Option<Availability>,
}

impl<S: MessageSink> Publisher<S> {
    pub fn new(sink: S, config: &Mqtt, sensors: &'static [SensorDefinition]) -> Publisher<S> {
        Publisher {
            sink,
            sensors,
            qos: config.qos(),
            topic_base: config.topic_base.clone(),
            discovery_prefix: config.discovery_prefix.clone(),
            availability_topic: config.availability_topic(),
            discovery_published: false,
            availability: None,
        }
    }

    /// Returns `true` once the discovery messages have been sent
    pub fn discovery_published(&self) -> bool {
        self.discovery_published
    }

    /// Last availability sent, if any
    pub fn availability(&self) -> Option<Availability> {
        self.availability
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<(), S::Error> {
        debug!("Publishing to topic {topic} : {payload}");
        self.sink.publish(topic, payload, self.qos, true).await
    }

    /// Publishes the availability flag of the device
    pub async fn publish_availability(&mut self, availability: Availability) {
        let result = self
            .publish(&self.availability_topic, availability.as_str().to_string())
            .await;
        match result {
            Ok(()) => self.availability = Some(availability),
            Err(e) => error!("Cannot publish availability: {e}"),
        }
    }

    /// Registers every sensor in Home Assistant. Only the first call publishes anything.
    pub async fn publish_discovery(&mut self, device: &DeviceIdentity) -> Result<(), Box<dyn Error>> {
        if self.discovery_published {
            return Ok(());
        }

        for sensor in self.sensors {
            let config =
                DiscoveryConfig::new(sensor, device, &self.topic_base, &self.availability_topic);
            let payload = serde_json::to_string(&config)?;
            let topic = sensor.discovery_topic(&self.discovery_prefix);

            match self.publish(&topic, payload).await {
                Ok(()) => info!("Published discovery config for {}", sensor.name),
                Err(e) => warn!("Cannot publish discovery config for {}: {e}", sensor.name),
            }
        }

        self.discovery_published = true;
        Ok(())
    }

    /// Publishes every reported sensor value and returns how many were sent.
    ///
    /// Without any value the device is marked offline and no sensor topic is touched.
    pub async fn publish_metrics(&mut self, metrics: &Metrics) -> usize {
        if !metrics.has_data() {
            warn!("No UPS data to publish");
            self.publish_availability(Availability::Offline).await;
            return 0;
        }

        if self.availability != Some(Availability::Online) {
            self.publish_availability(Availability::Online).await;
        }

        let mut published = 0;
        for (sensor, value) in metrics.present() {
            let topic = sensor.state_topic(&self.topic_base);
            match self.publish(&topic, value.to_string()).await {
                Ok(()) => published += 1,
                Err(e) => error!("Error publishing {}: {e}", sensor.key),
            }
        }

        if published > 0 {
            info!("{}", summary(metrics, published));
        } else {
            warn!("No metrics were published");
        }

        published
    }

    /// Marks the device offline and closes the session
    pub async fn disconnect(&mut self) {
        self.publish_availability(Availability::Offline).await;
        match self.sink.disconnect().await {
            Ok(()) => info!("Disconnected from MQTT broker"),
            Err(e) => error!("Error disconnecting from MQTT broker: {e}"),
        }
    }
}

/// One-line report of the most useful values of a cycle
fn summary(metrics: &Metrics, published: usize) -> String {
    let show = |key: &str| metrics.get(key).unwrap_or("N/A");
    let runtime = metrics
        .get(RUNTIME_KEY)
        .map(format_runtime)
        .unwrap_or_else(|| String::from("N/A"));

    format!(
        "Published {published}/{} metrics - Battery: {}%, Runtime: {runtime}, Load: {}%, Status: {}, Input: {}V, Output: {}V, Battery Voltage: {}V",
        metrics.len(),
        show("battery_charge"),
        show("ups_load"),
        show("ups_status"),
        show("input_voltage_"),
        show("output_voltage"),
        show("battery_voltage_"),
    )
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use crate::configuration::Device;
    use crate::home_assistant::SENSORS;
    use crate::ups::RawTelemetry;

    const AVAILABILITY: &str = "homeassistant/sensor/ups/availability";

    fn mqtt() -> Mqtt {
        toml::from_str("host = \"localhost\"").expect("valid mqtt section")
    }

    fn telemetry(pairs: &[(&str, &str)]) -> RawTelemetry {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_discovery_is_published_once() {
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(sink.clone(), &mqtt(), SENSORS);
        let identity = DeviceIdentity::from_telemetry(&telemetry(&[]), &Device::default());

        publisher.publish_discovery(&identity).await.unwrap();
        publisher.publish_discovery(&identity).await.unwrap();

        let sent = sink.sent();
        assert!(publisher.discovery_published());
        assert_eq!(sent.len(), SENSORS.len());
        for sensor in SENSORS {
            assert_eq!(
                sink.on_topic(&sensor.discovery_topic("homeassistant")).len(),
                1
            );
        }
        assert!(sent.iter().all(|m| m.retain));
    }

    #[tokio::test]
    async fn test_absent_metrics_are_not_published() {
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(sink.clone(), &mqtt(), SENSORS);
        let metrics = Metrics::extract(
            &telemetry(&[("battery.charge", "87"), ("battery.runtime", "125")]),
            SENSORS,
        );

        assert_eq!(publisher.publish_metrics(&metrics).await, 2);

        let topics: Vec<_> = sink.sent().into_iter().map(|m| m.topic).collect();
        assert_eq!(
            topics,
            vec![
                AVAILABILITY,
                "homeassistant/sensor/ups/battery_charge",
                "homeassistant/sensor/ups/battery_runtime_",
            ]
        );
        assert_eq!(sink.on_topic(AVAILABILITY), vec!["online"]);
        assert!(sink.on_topic("homeassistant/sensor/ups/ups_load").is_empty());
    }

    #[test]
    fn test_summary() {
        let metrics = Metrics::extract(
            &telemetry(&[
                ("battery.charge", "87"),
                ("battery.runtime", "125"),
                ("battery.voltage", "13.5"),
                ("ups.status", "OB"),
            ]),
            SENSORS,
        );

        assert_eq!(
            summary(&metrics, 4),
            "Published 4/9 metrics - Battery: 87%, Runtime: 2m5s, Load: N/A%, Status: On Battery, Input: N/AV, Output: N/AV, Battery Voltage: 13.5V"
        );
    }

    #[tokio::test]
    async fn test_no_data_marks_offline() {
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(sink.clone(), &mqtt(), SENSORS);

        let metrics = Metrics::extract(&telemetry(&[("driver.name", "usbhid-ups")]), SENSORS);
        assert_eq!(publisher.publish_metrics(&metrics).await, 0);

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, AVAILABILITY);
        assert_eq!(sent[0].payload, "offline");
        assert_eq!(publisher.availability(), Some(Availability::Offline));
    }

    #[tokio::test]
    async fn test_online_is_restored_after_offline() {
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(sink.clone(), &mqtt(), SENSORS);
        let metrics = Metrics::extract(&telemetry(&[("ups.load", "10")]), SENSORS);

        publisher.publish_metrics(&metrics).await;
        publisher.publish_metrics(&metrics).await;
        publisher.publish_availability(Availability::Offline).await;
        publisher.publish_metrics(&metrics).await;

        assert_eq!(
            sink.on_topic(AVAILABILITY),
            vec!["online", "offline", "online"]
        );
        assert_eq!(sink.on_topic("homeassistant/sensor/ups/ups_load").len(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_marks_offline() {
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(sink.clone(), &mqtt(), SENSORS);

        publisher.disconnect().await;

        assert_eq!(sink.on_topic(AVAILABILITY), vec!["offline"]);
        assert!(sink.disconnected());
    }

    #[tokio::test]
    async fn test_publish_errors_are_not_fatal() {
        let sink = RecordingSink::default();
        let mut publisher = Publisher::new(sink.clone(), &mqtt(), SENSORS);
        sink.disconnect().await.unwrap();

        let metrics = Metrics::extract(&telemetry(&[("ups.load", "10")]), SENSORS);

        assert_eq!(publisher.publish_metrics(&metrics).await, 0);
        assert_eq!(publisher.availability(), None);
    }
}
