mod cli;
mod sinks;
mod wiring;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, MqttModeArg};
use qmc_iface::MqttMode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    let wired = wiring::wire(&cli).await?;
    wiring::spawn_background_tasks(&wired);

    let mqtt_mode = match cli.mqtt_mode {
        MqttModeArg::Azure => MqttMode::AzureIotHub {
            hub_name: cli.azure_hub_name.clone().ok_or_else(|| anyhow::anyhow!("--azure-hub-name is required with --mqtt-mode azure"))?,
            device_id: cli.device_id.clone(),
        },
        MqttModeArg::Generic => MqttMode::Generic { host: cli.mqtt_host.clone(), port: cli.mqtt_port, device_id: cli.device_id.clone() },
    };
    let mqtt_publisher = std::sync::Arc::new(qmc_iface::mqtt::LoggingPublisher);
    let mqtt_state = std::sync::Arc::new(wired.state.clone());
    tokio::spawn(async move { qmc_iface::mqtt::run(mqtt_state, mqtt_publisher, mqtt_mode).await });

    let error_counters = std::sync::Arc::new(qmc_iface::HttpErrorCounters::default());
    tokio::spawn(qmc_iface::run_error_logging_task(error_counters.clone()));

    qmc_iface::serve(cli.listen, wired.state.clone(), error_counters).await
}
