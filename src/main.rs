use nut_mqtt_bridge::configuration;
use nut_mqtt_bridge::daemon::Daemon;

const DEFAULT_CONFIG_PATH: &str = "/etc/nut-mqtt-bridge.conf";

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => path.as_str(),
        None => DEFAULT_CONFIG_PATH,
    };

    let config =
        configuration::Configuration::load(config_path).expect("Failed to load configuration");

    stderrlog::new()
        .module(module_path!())
        .verbosity(config.log_verbosity.saturating_sub(1))
        .init()
        .expect("Failed to initialize logging");

    if let Err(e) = Daemon::run(config).await {
        log::error!("Cannot start the daemon: {e}");
        std::process::exit(1);
    }
}
