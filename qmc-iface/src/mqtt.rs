use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use qmc_datahub::MotorId;

use crate::state::AppState;

/// The wire seam for MQTT publish (spec §6): the concrete client and
/// broker connection are out of scope per spec.md §1, so the only thing
/// this crate owns is the topic/payload construction and publish
/// cadence. `qmc-app` wires a concrete `MqttPublisher` once a transport
/// is available; tests and the default binary use `LoggingPublisher`.
pub trait MqttPublisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str);
}

/// Logs instead of publishing. Stands in for a real broker client, the
/// way `NoopShutdownSink`/`NoopFaultSink` stand in for their seams
/// elsewhere in the workspace.
pub struct LoggingPublisher;

impl MqttPublisher for LoggingPublisher {
    fn publish(&self, topic: &str, payload: &str) {
        debug!(topic, payload, "mqtt publish (no broker configured)");
    }
}

/// Build-time choice of addressing mode (spec §6).
#[derive(Debug, Clone)]
pub enum MqttMode {
    AzureIotHub { hub_name: String, device_id: String },
    Generic { host: String, port: u16, device_id: String },
}

/// Azure IoT Hub mode: `host = <hubName>.azure-devices.net:8883`,
/// `username = <host>/<deviceId>/?api-version=2021-04-12`, password
/// empty (client cert is the credential), and every logical topic
/// folded onto one physical topic with slashes replaced by `-`.
pub fn azure_host(hub_name: &str) -> String {
    format!("{hub_name}.azure-devices.net:8883")
}

pub fn azure_username(host: &str, device_id: &str) -> String {
    format!("{host}/{device_id}/?api-version=2021-04-12")
}

pub fn azure_topic(device_id: &str, logical_topic: &str) -> String {
    format!("devices/{device_id}/messages/events/topic=QMC_{device_id}-{}", logical_topic.replace('/', "-"))
}

/// Generic MQTT mode: standard broker, topics literal `QMC_<deviceId>/<logicalTopic>`.
pub fn generic_topic(device_id: &str, logical_topic: &str) -> String {
    format!("QMC_{device_id}/{logical_topic}")
}

pub fn topic_for(mode: &MqttMode, logical_topic: &str) -> String {
    match mode {
        MqttMode::AzureIotHub { hub_name, device_id } => azure_topic(device_id, &azure_host_topic_id(hub_name, device_id, logical_topic)),
        MqttMode::Generic { device_id, .. } => generic_topic(device_id, logical_topic),
    }
}

/// `azure_topic` already folds the logical topic into the physical one;
/// this trivial pass-through exists only so `topic_for`'s match arms
/// read symmetrically.
fn azure_host_topic_id(_hub_name: &str, _device_id: &str, logical_topic: &str) -> String {
    logical_topic.to_string()
}

fn bool_str(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}

fn motor_position_str(turns: i16, angle: u16) -> String {
    format!("{:.2}", turns as f64 + angle as f64 / 65535.0)
}

/// Spawns the cadence-driven publish loop (spec §6): FW version every
/// 5 s, system status on-change-or-5s, motor status every 25th DataHub
/// sample, log entries whenever one arrives.
pub async fn run(state: Arc<AppState>, publisher: Arc<dyn MqttPublisher>, mode: MqttMode) {
    tokio::join!(
        run_fw_version(state.clone(), publisher.clone(), mode.clone()),
        run_system_status(state.clone(), publisher.clone(), mode.clone()),
        run_motor_status(state.clone(), publisher.clone(), mode.clone()),
        run_log(state, publisher, mode),
    );
}

async fn run_fw_version(state: Arc<AppState>, publisher: Arc<dyn MqttPublisher>, mode: MqttMode) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        publisher.publish(&topic_for(&mode, "system/FW_version"), &state.fw_version);
    }
}

async fn run_system_status(state: Arc<AppState>, publisher: Arc<dyn MqttPublisher>, mode: MqttMode) {
    let mut last_raw = None;
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        let status = state.lifecycle.status();
        let raw = status.raw();
        if Some(raw) != last_raw {
            last_raw = Some(raw);
        }
        publisher.publish(&topic_for(&mode, "system/life_cycle_state"), status.lifecycle().as_str());
        publisher.publish(&topic_for(&mode, "system/system_fault_status"), &format!("{raw:08x}"));
    }
}

async fn run_motor_status(state: Arc<AppState>, publisher: Arc<dyn MqttPublisher>, mode: MqttMode) {
    const PRESCALER: u32 = 25;
    let handle = match state.datahub.get_new_status_queue(PRESCALER).await {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "mqtt motor-status subscription failed");
            return;
        }
    };
    loop {
        match state.datahub.dequeue_status(handle, Duration::from_secs(60)).await {
            Ok(status) => {
                let motor = status.motor_id.get() + 1;
                publisher.publish(&topic_for(&mode, &format!("motor_{motor}/fault_status")), &format!("{:x}", status.fault_bitset));
                publisher.publish(&topic_for(&mode, &format!("motor_{motor}/speed")), &format!("{:.2}", status.speed));
                publisher.publish(
                    &topic_for(&mode, &format!("motor_{motor}/position")),
                    &motor_position_str(status.position.turns, status.position.angle),
                );
            }
            Err(_) => continue,
        }
    }
}

async fn run_log(state: Arc<AppState>, publisher: Arc<dyn MqttPublisher>, mode: MqttMode) {
    let handle = match state.log.get_new_queue().await {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "mqtt log fan-out subscription failed");
            return;
        }
    };
    loop {
        match state.log.dequeue_encrypted(handle, Duration::from_secs(60)).await {
            Ok(record) => {
                let mut wire = Vec::new();
                wire.extend_from_slice(&record.length.to_be_bytes());
                wire.extend_from_slice(&record.keyiv_enc);
                wire.extend_from_slice(&record.record_enc);
                wire.extend_from_slice(&record.signature);
                publisher.publish(&topic_for(&mode, "log/latest_record"), &hex::encode_upper(wire));
            }
            Err(_) => continue,
        }
    }
}

/// Unused by `run`, kept for `qmc-app`'s log system-bit mirroring: the
/// `"true"`/`"false"` flags spec §6 calls out separately from the
/// encrypted record itself.
pub fn log_flag_topic(mode: &MqttMode, flag: &str, value: bool) -> (String, String) {
    (topic_for(mode, &format!("log/{flag}")), bool_str(value).to_string())
}

#[allow(dead_code)]
fn motor_topic_name(motor: MotorId) -> String {
    format!("motor_{}", motor.get() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn azure_mode_folds_logical_topic_and_replaces_slashes() {
        let mode = MqttMode::AzureIotHub { hub_name: "myhub".into(), device_id: "dev1".into() };
        let topic = topic_for(&mode, "motor_1/fault_status");
        assert_eq!(topic, "devices/dev1/messages/events/topic=QMC_dev1-motor_1-fault_status");
    }

    #[test]
    fn generic_mode_uses_literal_slash_separated_topic() {
        let mode = MqttMode::Generic { host: "broker".into(), port: 1883, device_id: "dev1".into() };
        assert_eq!(topic_for(&mode, "system/FW_version"), "QMC_dev1/system/FW_version");
    }

    #[test]
    fn azure_host_and_username_match_spec_format() {
        let host = azure_host("myhub");
        assert_eq!(host, "myhub.azure-devices.net:8883");
        assert_eq!(azure_username(&host, "dev1"), "myhub.azure-devices.net:8883/dev1/?api-version=2021-04-12");
    }

    #[test]
    fn motor_position_formats_turns_plus_fractional_angle() {
        assert_eq!(motor_position_str(2, 32768), "2.50");
    }
}
