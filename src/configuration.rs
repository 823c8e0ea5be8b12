use rumqttc::QoS;
use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use std::error::Error;
use std::time::Duration;

/// Contains the configuration for communicating with the MQTT broker
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Mqtt {
    /// Hostname or IP address of the broker. Required
    pub host: String,

    /// Port of the connection to the broker. Default: 1883
    #[serde_inline_default(1883)]
    pub port: u16,

    /// Username for the connection to the broker. Default: empty
    #[serde(default)]
    pub user: String,

    /// Password for the connection to the broker. Default: empty
    #[serde(default)]
    pub password: String,

    /// Client identifier presented to the broker. Default: `nut-mqtt-bridge-<hostname>`
    #[serde(default = "client_id")]
    pub client_id: String,

    /// Base of the state and availability topics. Default: homeassistant/sensor/ups
    #[serde_inline_default(String::from("homeassistant/sensor/ups"))]
    pub topic_base: String,

    /// Prefix for the discovery topics sent to Home Assistant. Default: homeassistant
    ///
    /// This must match the configuration of the MQTT integration in Home Assistant
    ///
    /// See <https://www.home-assistant.io/integrations/mqtt#discovery-options>
    #[serde_inline_default(String::from("homeassistant"))]
    pub discovery_prefix: String,

    /// Quality of service of every publication, 0 or 1. Default: 0
    #[serde_inline_default(0)]
    pub qos: u8,

    /// Keep alive interval in seconds. Default: 60
    #[serde_inline_default(60)]
    pub keep_alive: u64,
}

/// Contains the configuration of the UPS and of the NUT tools used to read it
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Ups {
    /// Name of the UPS as understood by `upsc`. Default: cyberpower@localhost
    #[serde_inline_default(String::from("cyberpower@localhost"))]
    pub name: String,

    /// Delay between each poll in seconds. Default: 2 seconds
    #[serde_inline_default(2)]
    pub poll_interval: u64,

    /// Command used to query the UPS, the UPS name is appended. Default: `upsc`
    #[serde_inline_default(vec![String::from("upsc")])]
    pub query_command: Vec<String>,

    /// Timeout of the query command in seconds. Default: 10
    #[serde_inline_default(10)]
    pub query_timeout: u64,

    /// Command controlling the driver, `stop` or `start` is appended. Default: `sudo upsdrvctl`
    #[serde_inline_default(vec![String::from("sudo"), String::from("upsdrvctl")])]
    pub driver_command: Vec<String>,

    /// Timeout of each driver command in seconds. Default: 30
    #[serde_inline_default(30)]
    pub driver_timeout: u64,

    /// Delay between stopping and starting the driver, in seconds. Default: 2
    #[serde_inline_default(2)]
    pub settle_delay: u64,

    /// Delay given to a restarted driver before polling again, in seconds. Default: 5
    #[serde_inline_default(5)]
    pub warmup_delay: u64,

    /// Substrings of the query error output that trigger a driver restart.
    ///
    /// They must match the text printed by the installed NUT version, including its locale.
    #[serde_inline_default(vec![String::from("Driver not connected"), String::from("Data stale")])]
    pub recovery_signatures: Vec<String>,
}

/// Static identity of the device, used when the UPS does not report its own
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Device {
    /// Display name of the device. Default: the model reported by the UPS
    pub name: Option<String>,

    /// Identifier used when the serial number is unknown. Default: the display name in snake case
    pub identifier: Option<String>,

    #[serde_inline_default(String::from("Unknown"))]
    pub manufacturer: String,

    #[serde_inline_default(String::from("Unknown"))]
    pub model: String,

    pub serial: Option<String>,
}

impl Default for Device {
    fn default() -> Self {
        Device {
            name: None,
            identifier: None,
            manufacturer: String::from("Unknown"),
            model: String::from("Unknown"),
            serial: None,
        }
    }
}

/// Contains all the configuration for `nut-mqtt-bridge`
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Configuration {
    /// Contains the configuration for communicating with the MQTT broker
    pub mqtt: Mqtt,

    /// Contains the configuration of the monitored UPS
    pub ups: Ups,

    /// Contains the fallback identity of the device
    #[serde(default)]
    pub device: Device,

    /// Sets the verbosity of the logs.
    ///  * 1 => Error
    ///  * 2 => Warning
    ///  * 3 => Info
    ///  * 4 => Debug
    ///  * 5 => Trace
    #[serde_inline_default(3)]
    #[serde(rename = "log-verbosity")]
    pub log_verbosity: usize,
}

fn client_id() -> String {
    let host = sysinfo::System::host_name().unwrap_or_else(|| String::from("localhost"));
    format!("nut-mqtt-bridge-{host}")
}

impl Mqtt {
    /// Quality of service used for every publication
    pub fn qos(&self) -> QoS {
        match self.qos {
            0 => QoS::AtMostOnce,
            _ => QoS::AtLeastOnce,
        }
    }

    /// Topic holding the `online`/`offline` flag shared by every sensor
    pub fn availability_topic(&self) -> String {
        format!("{}/availability", self.topic_base)
    }
}

impl Ups {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    pub fn driver_timeout(&self) -> Duration {
        Duration::from_secs(self.driver_timeout)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay)
    }

    pub fn warmup_delay(&self) -> Duration {
        Duration::from_secs(self.warmup_delay)
    }
}

impl Configuration {
    /// Load the configuration from a file and validate it
    ///
    /// ## Example
    ///
    /// ```
    /// use nut_mqtt_bridge::Configuration;
    ///
    /// let config = Configuration::load("conf/nut-mqtt-bridge.conf").expect("Cannot load configuration");
    ///
    /// assert_eq!(config.mqtt.host, "localhost");
    /// ```
    pub fn load(path: &str) -> Result<Configuration, Box<dyn Error>> {
        let config: Configuration = toml::from_str(std::fs::read_to_string(path)?.as_str())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that would prevent the bridge from working at all
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.mqtt.host.trim().is_empty() {
            return Err("mqtt.host must not be empty".into());
        }
        if self.mqtt.port == 0 {
            return Err("mqtt.port must not be 0".into());
        }
        if self.mqtt.qos > 1 {
            return Err(format!("mqtt.qos must be 0 or 1, got {}", self.mqtt.qos).into());
        }
        if self.mqtt.client_id.is_empty() || self.mqtt.client_id.starts_with(' ') {
            return Err("mqtt.client-id must not be empty or start with a space".into());
        }
        if self.mqtt.keep_alive < 5 {
            return Err("mqtt.keep-alive must be at least 5 seconds".into());
        }
        if self.ups.poll_interval == 0 {
            return Err("ups.poll-interval must be at least 1 second".into());
        }
        if self.ups.query_command.is_empty() {
            return Err("ups.query-command must not be empty".into());
        }
        if self.ups.driver_command.is_empty() {
            return Err("ups.driver-command must not be empty".into());
        }
        if self.ups.recovery_signatures.iter().all(|s| s.is_empty()) {
            return Err("ups.recovery-signatures must contain at least one signature".into());
        }
        Ok(())
    }
}
