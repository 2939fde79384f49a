use std::sync::Arc;

use qmc_datahub::MotorId;
use qmc_kernel::event_group::EventGroup;

/// Lifecycle bits, one-hot within bits 0..4 (spec §3 `LifecycleState`,
/// §3 `SystemStatus`).
pub const BIT_LC_COMMISSIONING: u32 = 1 << 0;
pub const BIT_LC_OPERATIONAL: u32 = 1 << 1;
pub const BIT_LC_ERROR: u32 = 1 << 2;
pub const BIT_LC_MAINTENANCE: u32 = 1 << 3;
pub const BIT_LC_DECOMMISSIONING: u32 = 1 << 4;
const LC_MASK: u32 = BIT_LC_COMMISSIONING | BIT_LC_OPERATIONAL | BIT_LC_ERROR | BIT_LC_MAINTENANCE | BIT_LC_DECOMMISSIONING;

/// Per-motor fault bits, bits 5..8.
pub const BIT_FAULT_MOTOR_BASE: u32 = 5;
/// System-wide fault bit, bit 9.
pub const BIT_FAULT_SYSTEM: u32 = 1 << 9;
/// Firmware-update bits, bits 10..11 (`restart_required_configuration_backup`,
/// `restart_required_fw_update_commit`).
pub const BIT_FWU_CONFIG_BACKUP_RESTART: u32 = 1 << 10;
pub const BIT_FWU_COMMIT_RESTART: u32 = 1 << 11;
/// Config-changed bit, bit 12.
pub const BIT_CONFIG_CHANGED: u32 = 1 << 12;
/// Anomaly bits, bits 13..14.
pub const BIT_ANOMALY_0: u32 = 1 << 13;
pub const BIT_ANOMALY_1: u32 = 1 << 14;
/// Shutdown bits, bits 15..16 (spec §4.9).
pub const BIT_SHUTDOWN_POWER_LOSS: u32 = 1 << 15;
pub const BIT_SHUTDOWN_WATCHDOG_RESET: u32 = 1 << 16;
/// SD-card-available bit, bit 17.
pub const BIT_SD_CARD_AVAILABLE: u32 = 1 << 17;
/// Network bits, bits 18..19.
pub const BIT_NETWORK_0: u32 = 1 << 18;
pub const BIT_NETWORK_1: u32 = 1 << 19;
/// Log bits, bits 20..21 (`SYSEVENT_LOG_MESSAGE_LOST`,
/// `SYSEVENT_LOG_FLASH_ERROR` mirrored here for REST/MQTT readers that
/// only look at `SystemStatus`; `qmc-log` is still the source of truth
/// for its own `system_bits()`).
pub const BIT_LOG_MESSAGE_LOST: u32 = 1 << 20;
pub const BIT_LOG_FLASH_ERROR: u32 = 1 << 21;

/// The five lifecycle states of spec §3 `LifecycleState`, encoded
/// one-hot on `SystemStatus` bits 0..4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Commissioning,
    Operational,
    Error,
    Maintenance,
    Decommissioning,
}

impl LifecycleState {
    pub fn bit(self) -> u32 {
        match self {
            LifecycleState::Commissioning => BIT_LC_COMMISSIONING,
            LifecycleState::Operational => BIT_LC_OPERATIONAL,
            LifecycleState::Error => BIT_LC_ERROR,
            LifecycleState::Maintenance => BIT_LC_MAINTENANCE,
            LifecycleState::Decommissioning => BIT_LC_DECOMMISSIONING,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits & LC_MASK {
            BIT_LC_COMMISSIONING => Some(LifecycleState::Commissioning),
            BIT_LC_OPERATIONAL => Some(LifecycleState::Operational),
            BIT_LC_ERROR => Some(LifecycleState::Error),
            BIT_LC_MAINTENANCE => Some(LifecycleState::Maintenance),
            BIT_LC_DECOMMISSIONING => Some(LifecycleState::Decommissioning),
            _ => None,
        }
    }

    /// The string form published on MQTT's `system/life_cycle_state`
    /// (spec §6) and returned by the `/system` REST endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Commissioning => "Commissioning",
            LifecycleState::Operational => "Operational",
            LifecycleState::Error => "Error",
            LifecycleState::Maintenance => "Maintenance",
            LifecycleState::Decommissioning => "Decommissioning",
        }
    }

    pub fn from_str_name(name: &str) -> Option<Self> {
        match name {
            "Commissioning" => Some(LifecycleState::Commissioning),
            "Operational" => Some(LifecycleState::Operational),
            "Error" => Some(LifecycleState::Error),
            "Maintenance" => Some(LifecycleState::Maintenance),
            "Decommissioning" => Some(LifecycleState::Decommissioning),
            _ => None,
        }
    }
}

/// Thin wrapper over the shared 24-bit `SystemStatus` event group (spec
/// §3): enforces the one-hot lifecycle invariant at every write and
/// gives named accessors for the other bit groups so `qmc-iface` and
/// `qmc-app` don't hand-roll masks. The event group itself is the
/// general-purpose `qmc-kernel` primitive; this type layers the
/// `SystemStatus`-specific semantics on top, per `event_group.rs`'s own
/// doc comment.
pub struct SystemStatus {
    events: Arc<EventGroup>,
}

impl SystemStatus {
    pub fn new() -> Self {
        Self { events: EventGroup::new() }
    }

    pub fn events(&self) -> Arc<EventGroup> {
        self.events.clone()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::from_bits(self.events.get()).unwrap_or(LifecycleState::Commissioning)
    }

    /// Atomically replaces whichever lifecycle bit is set with `state`'s
    /// bit, preserving the one-hot invariant (spec §3: "exactly one
    /// lifecycle bit is set at any time").
    pub fn set_lifecycle(&self, state: LifecycleState) {
        self.events.clear(LC_MASK);
        self.events.set(state.bit());
    }

    pub fn motor_fault_bit(motor: MotorId) -> u32 {
        1 << (BIT_FAULT_MOTOR_BASE + motor.get() as u32)
    }

    pub fn set_motor_fault(&self, motor: MotorId) {
        self.events.set(Self::motor_fault_bit(motor));
    }

    pub fn clear_motor_fault(&self, motor: MotorId) {
        self.events.clear(Self::motor_fault_bit(motor));
    }

    pub fn set_system_fault(&self) {
        self.events.set(BIT_FAULT_SYSTEM);
    }

    pub fn clear_system_fault(&self) {
        self.events.clear(BIT_FAULT_SYSTEM);
    }

    pub fn any_fault(&self) -> bool {
        let bits = self.events.get();
        bits & BIT_FAULT_SYSTEM != 0 || MotorId::all().any(|m| bits & Self::motor_fault_bit(m) != 0)
    }

    pub fn set_sd_card_available(&self, available: bool) {
        if available {
            self.events.set(BIT_SD_CARD_AVAILABLE);
        } else {
            self.events.clear(BIT_SD_CARD_AVAILABLE);
        }
    }

    pub fn set_config_changed(&self) {
        self.events.set(BIT_CONFIG_CHANGED);
    }

    pub fn clear_config_changed(&self) {
        self.events.clear(BIT_CONFIG_CHANGED);
    }

    pub fn raw(&self) -> u32 {
        self.events.get()
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_write_is_one_hot() {
        let status = SystemStatus::new();
        status.set_lifecycle(LifecycleState::Commissioning);
        status.set_lifecycle(LifecycleState::Operational);
        assert_eq!(status.lifecycle(), LifecycleState::Operational);
        assert_eq!(status.raw() & BIT_LC_COMMISSIONING, 0);
    }

    #[test]
    fn motor_fault_bits_are_independent_per_motor() {
        let status = SystemStatus::new();
        let m0 = MotorId::new(0).unwrap();
        let m1 = MotorId::new(1).unwrap();
        status.set_motor_fault(m0);
        assert!(status.any_fault());
        status.clear_motor_fault(m0);
        assert!(!status.any_fault());
        status.set_motor_fault(m1);
        assert!(status.any_fault());
    }

    #[test]
    fn default_lifecycle_reads_commissioning_with_no_bit_set() {
        let status = SystemStatus::new();
        assert_eq!(status.lifecycle(), LifecycleState::Commissioning);
        assert_eq!(status.raw(), 0);
    }
}
