use crate::home_assistant::{SensorDefinition, ValueKind};
use crate::status::decode_status;
use crate::ups::RawTelemetry;

/// Value of one sensor for the current poll
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub sensor: &'static SensorDefinition,

    /// `None` when the UPS did not report the variable
    pub value: Option<String>,
}

/// Sensor values of one poll, in the order of the sensor definitions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metrics {
    values: Vec<Metric>,
}

impl Metrics {
    /// Reads every sensor from the telemetry. Missing variables are marked as absent.
    pub fn extract(telemetry: &RawTelemetry, sensors: &'static [SensorDefinition]) -> Metrics {
        let values = sensors
            .iter()
            .map(|sensor| Metric {
                sensor,
                value: telemetry
                    .get(sensor.variable)
                    .map(|raw| match sensor.kind {
                        ValueKind::Raw => raw.clone(),
                        ValueKind::StatusFlags => decode_status(raw),
                    }),
            })
            .collect();

        Metrics { values }
    }

    /// Value of the sensor with the given key, if it was reported
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|m| m.sensor.key == key)
            .and_then(|m| m.value.as_deref())
    }

    /// Metrics that have a value
    pub fn present(&self) -> impl Iterator<Item = (&'static SensorDefinition, &str)> + '_ {
        self.values
            .iter()
            .filter_map(|m| m.value.as_deref().map(|value| (m.sensor, value)))
    }

    /// Returns `true` if at least one sensor has a value
    pub fn has_data(&self) -> bool {
        self.present().next().is_some()
    }

    /// Number of sensors, reported or not
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Formats a runtime in seconds as `<minutes>m<seconds>s`.
///
/// Values that are not numbers are shown as reported followed by `s`.
pub fn format_runtime(value: &str) -> String {
    match value.trim().parse::<f64>() {
        Ok(seconds) if seconds.is_finite() => {
            let seconds = seconds.trunc() as i64;
            format!("{}m{}s", seconds.div_euclid(60), seconds.rem_euclid(60))
        }
        _ => format!("{value}s"),
    }
}
