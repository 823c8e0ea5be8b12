use async_trait::async_trait;
use nut_mqtt_bridge::command::{CommandError, CommandOutput, CommandRunner};
use nut_mqtt_bridge::configuration::Configuration;
use nut_mqtt_bridge::daemon::{CycleOutcome, Daemon};
use nut_mqtt_bridge::home_assistant::SENSORS;
use nut_mqtt_bridge::publisher::MessageSink;
use rumqttc::QoS;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const UPSC_OUTPUT: &str = "\
battery.charge: 87
battery.runtime: 125
battery.voltage: 13.5
device.mfr: CPS
device.model: CP1500EPFCLCD
device.serial: BH8PZ2000287
input.voltage: 232.0
output.voltage: 232.0
ups.load: 12
ups.model: CP1500EPFCLCD
ups.realpower.nominal: 900
ups.status: OL CHRG
";

#[derive(Clone, Default)]
struct FakeNut {
    replies: Arc<Mutex<VecDeque<CommandOutput>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeNut {
    fn answer(&self, exit_code: i32, stdout: &str, stderr: &str) {
        self.replies.lock().unwrap().push_back(CommandOutput {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        });
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeNut {
    async fn run(&self, argv: &[String], _timeout: Duration) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(argv.join(" "));
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
struct Message {
    topic: String,
    payload: String,
    qos: QoS,
    retain: bool,
}

#[derive(Clone, Default)]
struct FakeBroker {
    messages: Arc<Mutex<Vec<Message>>>,
    disconnected: Arc<Mutex<bool>>,
}

impl FakeBroker {
    fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    fn payloads(&self, topic: &str) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload)
            .collect()
    }
}

#[async_trait]
impl MessageSink for FakeBroker {
    type Error = std::io::Error;

    async fn publish(
        &self,
        topic: &str,
        payload: String,
        qos: QoS,
        retain: bool,
    ) -> Result<(), std::io::Error> {
        self.messages.lock().unwrap().push(Message {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), std::io::Error> {
        *self.disconnected.lock().unwrap() = true;
        Ok(())
    }
}

fn config() -> Result<Configuration, Box<dyn Error>> {
    let mut conf = Configuration::load("conf/nut-mqtt-bridge.conf")?;
    conf.ups.settle_delay = 0;
    conf.ups.warmup_delay = 0;
    Ok(conf)
}

#[tokio::test]
async fn test_full_report() -> Result<(), Box<dyn Error>> {
    let nut = FakeNut::default();
    let broker = FakeBroker::default();
    let mut daemon = Daemon::new(config()?, nut.clone(), broker.clone());

    nut.answer(0, UPSC_OUTPUT, "");
    assert_eq!(daemon.poll_once().await?, CycleOutcome::Published(SENSORS.len()));
    assert_eq!(nut.calls(), vec!["upsc cyberpower@localhost"]);

    let messages = broker.messages();
    assert!(messages.iter().all(|m| m.retain && m.qos == QoS::AtMostOnce));
    assert_eq!(messages.len(), 2 * SENSORS.len() + 1);

    let base = "homeassistant/sensor/ups";
    assert_eq!(broker.payloads(&format!("{base}/availability")), vec!["online"]);
    assert_eq!(broker.payloads(&format!("{base}/battery_charge")), vec!["87"]);
    assert_eq!(broker.payloads(&format!("{base}/battery_runtime_")), vec!["125"]);
    assert_eq!(broker.payloads(&format!("{base}/ups_status")), vec!["Online + Charging"]);
    assert_eq!(broker.payloads(&format!("{base}/ups_nominal_power")), vec!["900"]);

    let config = broker.payloads("homeassistant/sensor/ups_battery_charge/config");
    assert_eq!(config.len(), 1);
    let json: HashMap<String, Value> = serde_json::from_str(&config[0])?;
    assert_eq!(json["name"].as_str().unwrap(), "CP1500EPFCLCD UPS Battery Charge");
    assert_eq!(json["unique_id"].as_str().unwrap(), "ups_battery_charge");
    assert_eq!(
        json["state_topic"].as_str().unwrap(),
        "homeassistant/sensor/ups/battery_charge"
    );
    assert_eq!(
        json["availability_topic"].as_str().unwrap(),
        "homeassistant/sensor/ups/availability"
    );
    assert_eq!(json["device"]["identifiers"][0].as_str().unwrap(), "BH8PZ2000287");
    assert_eq!(json["device"]["manufacturer"].as_str().unwrap(), "CPS");
    assert_eq!(json["device"]["serial_number"].as_str().unwrap(), "BH8PZ2000287");

    Ok(())
}

#[tokio::test]
async fn test_stale_driver_is_restarted() -> Result<(), Box<dyn Error>> {
    let nut = FakeNut::default();
    let broker = FakeBroker::default();
    let mut daemon = Daemon::new(config()?, nut.clone(), broker.clone());

    nut.answer(1, "", "Error: Data stale\n");
    nut.answer(0, "", "");
    nut.answer(0, "", "");
    nut.answer(0, UPSC_OUTPUT, "");

    assert_eq!(
        daemon.poll_once().await?,
        CycleOutcome::Failed { recovered: Some(true) }
    );
    assert_eq!(daemon.poll_once().await?, CycleOutcome::Published(SENSORS.len()));

    assert_eq!(
        nut.calls(),
        vec![
            "upsc cyberpower@localhost",
            "sudo upsdrvctl stop",
            "sudo upsdrvctl start",
            "upsc cyberpower@localhost",
        ]
    );
    assert_eq!(
        broker.payloads("homeassistant/sensor/ups/availability"),
        vec!["offline", "online"]
    );

    Ok(())
}

#[tokio::test]
async fn test_shutdown_marks_offline() -> Result<(), Box<dyn Error>> {
    let nut = FakeNut::default();
    let broker = FakeBroker::default();
    let mut daemon = Daemon::new(config()?, nut.clone(), broker.clone());

    nut.answer(0, UPSC_OUTPUT, "");
    daemon.serve(tokio::time::sleep(Duration::from_millis(10))).await;

    assert_eq!(nut.calls().len(), 1);
    assert_eq!(
        broker.payloads("homeassistant/sensor/ups/availability"),
        vec!["online", "offline"]
    );
    assert!(*broker.disconnected.lock().unwrap());

    Ok(())
}
