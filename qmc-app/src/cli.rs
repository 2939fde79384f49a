use std::net::SocketAddr;

use clap::Parser;

/// Startup configuration (spec §6): listen address, device identity,
/// firmware version string, and the MQTT addressing mode, all read once
/// via `clap`.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Address the REST/JSON API binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Device identity reported on `/system` and used to build MQTT topics.
    #[arg(long, default_value = "qmc-0001")]
    pub device_id: String,

    /// Firmware version string reported on `/system` and `system/FW_version`.
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    pub fw_version: String,

    /// MQTT addressing mode.
    #[arg(long, value_enum, default_value_t = MqttModeArg::Generic)]
    pub mqtt_mode: MqttModeArg,

    /// Azure IoT Hub name (required when `--mqtt-mode azure`).
    #[arg(long)]
    pub azure_hub_name: Option<String>,

    /// Generic-mode broker host (required when `--mqtt-mode generic`).
    #[arg(long, default_value = "localhost")]
    pub mqtt_host: String,

    /// Generic-mode broker port.
    #[arg(long, default_value_t = 1883)]
    pub mqtt_port: u16,

    /// Directory for the file-backed stand-ins of out-of-scope hardware
    /// state (SNVS-LP-GPR word, config flash, log flash rings).
    #[arg(long, default_value = "./qmc-app-state")]
    pub state_dir: std::path::PathBuf,

    /// Session lifetime handed to newly created user sessions.
    #[arg(long, default_value_t = 3600)]
    pub session_duration_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MqttModeArg {
    Azure,
    Generic,
}
