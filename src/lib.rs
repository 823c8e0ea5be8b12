//! # nut-mqtt-bridge
//!
//! `nut-mqtt-bridge` polls a UPS through Network UPS Tools and publishes its state to the
//! MQTT integration of Home Assistant
//!
//!

pub use self::command::CommandRunner;
pub use self::command::SystemCommandRunner;
pub use self::configuration::Configuration;
pub use self::daemon::CycleOutcome;
pub use self::daemon::Daemon;
pub use self::home_assistant::DeviceIdentity;
pub use self::home_assistant::SENSORS;
pub use self::home_assistant::SensorDefinition;
pub use self::metrics::Metrics;
pub use self::publisher::MessageSink;
pub use self::publisher::Publisher;
pub use self::status::Availability;
pub use self::ups::RawTelemetry;

/// Contains the external command seam
pub mod command;
/// Contains the configuration stuff
pub mod configuration;
/// Contains the daemon code
pub mod daemon;
/// Contains Home Assistant registration data
pub mod home_assistant;
/// Contains the extraction of sensor values from the UPS variables
pub mod metrics;
/// Contains the MQTT session
pub mod mqtt;
/// Contains the publication of the UPS state
pub mod publisher;
/// Contains the NUT driver restart
pub mod recovery;
/// Contains the UPS status flags and the availability values
pub mod status;
/// Contains the UPS query
pub mod ups;
