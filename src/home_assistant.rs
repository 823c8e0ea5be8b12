use crate::configuration::Device as DeviceConfig;
use crate::ups::RawTelemetry;
use convert_case::{Case, Casing};
use serde::Serialize;
use std::fmt;

/// How the reported value of a sensor is turned into the published state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Published as reported
    Raw,

    /// Space separated NUT status flags, published as readable text
    StatusFlags,
}

/// Static description of a sensor published to Home Assistant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorDefinition {
    /// Name of the sensor, shown in Home Assistant after the device name
    pub name: &'static str,

    /// Short key, used in the state topic and in the unique ID
    pub key: &'static str,

    /// Unit used in the report
    pub unit: Option<&'static str>,

    /// See <https://www.home-assistant.io/integrations/sensor#device-class> for possible values here
    pub device_class: Option<&'static str>,

    pub icon: Option<&'static str>,

    /// Describes how Home Assistant stores the data
    pub state_class: Option<&'static str>,

    pub enabled_by_default: bool,

    /// NUT variable holding the value
    pub variable: &'static str,

    pub kind: ValueKind,
}

/// Key of the battery runtime sensor, in seconds
pub const RUNTIME_KEY: &str = "battery_runtime_";

/// Every sensor published for the UPS, in publication order
pub const SENSORS: &[SensorDefinition] = &[
    SensorDefinition {
        name: "UPS Battery Charge",
        key: "battery_charge",
        unit: Some("%"),
        device_class: Some("battery"),
        icon: Some("mdi:battery"),
        state_class: Some("measurement"),
        enabled_by_default: true,
        variable: "battery.charge",
        kind: ValueKind::Raw,
    },
    SensorDefinition {
        name: "UPS Battery Runtime",
        key: RUNTIME_KEY,
        unit: Some("s"),
        device_class: None,
        icon: Some("mdi:timer-outline"),
        state_class: Some("measurement"),
        enabled_by_default: true,
        variable: "battery.runtime",
        kind: ValueKind::Raw,
    },
    SensorDefinition {
        name: "UPS Load",
        key: "ups_load",
        unit: Some("%"),
        device_class: Some("power_factor"),
        icon: Some("mdi:gauge"),
        state_class: Some("measurement"),
        enabled_by_default: true,
        variable: "ups.load",
        kind: ValueKind::Raw,
    },
    SensorDefinition {
        name: "UPS Status",
        key: "ups_status",
        unit: None,
        device_class: None,
        icon: Some("mdi:power-plug"),
        state_class: None,
        enabled_by_default: true,
        variable: "ups.status",
        kind: ValueKind::StatusFlags,
    },
    SensorDefinition {
        name: "UPS Output Voltage",
        key: "output_voltage",
        unit: Some("V"),
        device_class: Some("voltage"),
        icon: Some("mdi:current-ac"),
        state_class: Some("measurement"),
        enabled_by_default: true,
        variable: "output.voltage",
        kind: ValueKind::Raw,
    },
    SensorDefinition {
        name: "UPS Input Voltage",
        key: "input_voltage_",
        unit: Some("V"),
        device_class: Some("voltage"),
        icon: Some("mdi:current-ac"),
        state_class: Some("measurement"),
        enabled_by_default: true,
        variable: "input.voltage",
        kind: ValueKind::Raw,
    },
    SensorDefinition {
        name: "UPS Battery Voltage",
        key: "battery_voltage_",
        unit: Some("V"),
        device_class: Some("voltage"),
        icon: Some("mdi:battery-heart-variant"),
        state_class: Some("measurement"),
        enabled_by_default: true,
        variable: "battery.voltage",
        kind: ValueKind::Raw,
    },
    SensorDefinition {
        name: "UPS Nominal Power",
        key: "ups_nominal_power",
        unit: Some("W"),
        device_class: Some("power"),
        icon: Some("mdi:flash"),
        state_class: Some("measurement"),
        enabled_by_default: true,
        variable: "ups.realpower.nominal",
        kind: ValueKind::Raw,
    },
    SensorDefinition {
        name: "UPS Model",
        key: "ups_model",
        unit: None,
        device_class: None,
        icon: Some("mdi:information-outline"),
        state_class: None,
        enabled_by_default: true,
        variable: "ups.model",
        kind: ValueKind::Raw,
    },
];

impl SensorDefinition {
    /// Unique ID of the entity in Home Assistant
    pub fn unique_id(&self) -> String {
        format!("ups_{}", self.key)
    }

    /// Topic of the discovery message of this sensor
    pub fn discovery_topic(&self, prefix: &str) -> String {
        format!("{prefix}/sensor/{}/config", self.unique_id())
    }

    /// Topic holding the state of this sensor
    pub fn state_topic(&self, topic_base: &str) -> String {
        format!("{topic_base}/{}", self.key)
    }
}

/// Identity of the UPS as shown in the Home Assistant device registry
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    identifiers: Vec<String>,
    name: String,
    model: String,
    manufacturer: String,
    #[serde(rename = "serial_number", skip_serializing_if = "Option::is_none")]
    serial: Option<String>,
}

fn reported(telemetry: &RawTelemetry, variables: &[&str]) -> Option<String> {
    variables
        .iter()
        .filter_map(|v| telemetry.get(*v))
        .find(|value| !value.is_empty())
        .cloned()
}

impl DeviceIdentity {
    /// Builds the identity from what the UPS reports, completed by the configured values
    pub fn from_telemetry(telemetry: &RawTelemetry, config: &DeviceConfig) -> DeviceIdentity {
        let reported_model = reported(telemetry, &["device.model", "ups.model"]);
        let serial =
            reported(telemetry, &["device.serial", "ups.serial"]).or_else(|| config.serial.clone());

        let name = config
            .name
            .clone()
            .or_else(|| reported_model.clone())
            .unwrap_or_else(|| String::from("UPS"));
        let identifier = serial
            .clone()
            .or_else(|| config.identifier.clone())
            .unwrap_or_else(|| name.to_case(Case::Snake));

        DeviceIdentity {
            identifiers: vec![identifier],
            name,
            model: reported_model.unwrap_or_else(|| config.model.clone()),
            manufacturer: reported(telemetry, &["device.mfr", "ups.mfr"])
                .unwrap_or_else(|| config.manufacturer.clone()),
            serial,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Describes the origin of the messages, in this case `nut-mqtt-bridge`
#[derive(Serialize, Debug)]
pub struct Origin {
    name: &'static str,
    sw_version: &'static str,
    url: &'static str,
}

impl Origin {
    fn current() -> Origin {
        Origin {
            name: env!("CARGO_PKG_NAME"),
            sw_version: env!("CARGO_PKG_VERSION"),
            url: env!("CARGO_PKG_HOMEPAGE"),
        }
    }
}

/// Discovery message registering one sensor in Home Assistant
///
/// See <https://www.home-assistant.io/integrations/sensor.mqtt/>
#[derive(Serialize, Debug)]
pub struct DiscoveryConfig<'a> {
    name: String,
    unique_id: String,
    state_topic: String,
    availability_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'static str>,
    enabled_by_default: bool,
    device: &'a DeviceIdentity,
    origin: Origin,
}

impl<'a> DiscoveryConfig<'a> {
    pub fn new(
        sensor: &SensorDefinition,
        device: &'a DeviceIdentity,
        topic_base: &str,
        availability_topic: &str,
    ) -> DiscoveryConfig<'a> {
        DiscoveryConfig {
            name: format!("{} {}", device.name, sensor.name),
            unique_id: sensor.unique_id(),
            state_topic: sensor.state_topic(topic_base),
            availability_topic: availability_topic.to_string(),
            icon: sensor.icon,
            unit_of_measurement: sensor.unit,
            device_class: sensor.device_class,
            state_class: sensor.state_class,
            enabled_by_default: sensor.enabled_by_default,
            device,
            origin: Origin::current(),
        }
    }
}

impl fmt::Display for DiscoveryConfig<'_> {
    /// Formats the discovery message in JSON format
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Ok(config) = serde_json::to_string(&self) else {
            return Err(fmt::Error);
        };
        write!(f, "{config}")
    }
}
