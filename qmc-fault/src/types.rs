use bitflags::bitflags;
use qmc_datahub::MotorId;

bitflags! {
    /// Per-motor PSB fault bits, reported from either the motor-control
    /// plane or the board-service plane (spec §3 `FaultSource`'s
    /// "motor-bits": overcurrent, under/overvoltage, overload, overspeed,
    /// rotor blocked, per-sensor overtemperature, six GD3000 faults).
    /// An empty set is the plane's `NoFault*` clearing signal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MotorFaultBits: u32 {
        const OVER_CURRENT             = 1 << 0;
        const UNDER_DC_BUS_VOLTAGE      = 1 << 1;
        const OVER_DC_BUS_VOLTAGE       = 1 << 2;
        const OVER_LOAD                 = 1 << 3;
        const OVER_SPEED                = 1 << 4;
        const ROTOR_BLOCKED             = 1 << 5;
        const GD3000_OVER_TEMPERATURE   = 1 << 6;
        const GD3000_DESATURATION       = 1 << 7;
        const GD3000_LOW_VLS            = 1 << 8;
        const GD3000_OVER_CURRENT       = 1 << 9;
        const GD3000_PHASE_ERROR        = 1 << 10;
        const GD3000_RESET              = 1 << 11;
        const PSB_OVER_TEMPERATURE_1    = 1 << 12;
        const PSB_OVER_TEMPERATURE_2    = 1 << 13;
    }
}

bitflags! {
    /// System-wide fault bits (spec §3 `FaultSource`'s "system-bits").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SystemFaultBits: u32 {
        const DB_OVER_TEMPERATURE              = 1 << 0;
        const MCU_OVER_TEMPERATURE             = 1 << 1;
        const PMIC_UNDER_VOLTAGE_1              = 1 << 2;
        const PMIC_UNDER_VOLTAGE_2              = 1 << 3;
        const PMIC_UNDER_VOLTAGE_3              = 1 << 4;
        const PMIC_UNDER_VOLTAGE_4              = 1 << 5;
        const PMIC_OVER_TEMPERATURE             = 1 << 6;
        const EMERGENCY_STOP                    = 1 << 7;
        const AFE_DB_COMMUNICATION_ERROR        = 1 << 8;
        const DB_TEMP_SENS_COMMUNICATION_ERROR  = 1 << 9;
    }
}

bitflags! {
    /// The "fault-handling error plane" (spec §4.3 point 4): AFE/RPC
    /// comms errors plus the two overflow sticky bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FaultHandlingErrorBits: u32 {
        const AFE_PSB_COMMUNICATION_ERROR = 1 << 0;
        const RPC_FAILURE                  = 1 << 1;
        const FAULT_BUFFER_OVERFLOW        = 1 << 2;
        const FAULT_QUEUE_OVERFLOW         = 1 << 3;
    }
}

impl FaultHandlingErrorBits {
    pub const OVERFLOW: FaultHandlingErrorBits =
        FaultHandlingErrorBits::FAULT_BUFFER_OVERFLOW.union(FaultHandlingErrorBits::FAULT_QUEUE_OVERFLOW);
}

/// One dispatched fault event. Each plane is `None` when untouched this
/// event, `Some(bits)` otherwise — an empty `bits` value for the motor or
/// system planes is that plane's `NoFault*` clearing signal (spec §4.3
/// "partitions the bitmask into four disjoint planes").
#[derive(Debug, Clone, Copy)]
pub struct FaultSource {
    pub motor_id: MotorId,
    pub mc_fault: Option<MotorFaultBits>,
    pub bs_fault: Option<MotorFaultBits>,
    pub system_fault: Option<SystemFaultBits>,
    pub handling_error: Option<FaultHandlingErrorBits>,
    /// Set when the raiser observed bits outside any known plane
    /// (`INVALID_FAULT_BITS`, spec §4.3 tie-break rules).
    pub invalid: bool,
}

impl FaultSource {
    pub fn motor_mc(motor_id: MotorId, bits: MotorFaultBits) -> Self {
        Self { motor_id, mc_fault: Some(bits), bs_fault: None, system_fault: None, handling_error: None, invalid: false }
    }

    pub fn motor_bs(motor_id: MotorId, bits: MotorFaultBits) -> Self {
        Self { motor_id, mc_fault: None, bs_fault: Some(bits), system_fault: None, handling_error: None, invalid: false }
    }

    pub fn system(bits: SystemFaultBits, motor_id: MotorId) -> Self {
        Self { motor_id, mc_fault: None, bs_fault: None, system_fault: Some(bits), handling_error: None, invalid: false }
    }

    pub fn handling_error(bits: FaultHandlingErrorBits, motor_id: MotorId) -> Self {
        Self { motor_id, mc_fault: None, bs_fault: None, system_fault: None, handling_error: Some(bits), invalid: false }
    }

    pub fn invalid(motor_id: MotorId) -> Self {
        Self { motor_id, mc_fault: None, bs_fault: None, system_fault: None, handling_error: None, invalid: true }
    }
}

/// The process-wide sticky fault summary (spec §3 `SystemFaultStatus`).
/// Overflow bits stay set until both `FaultBuffer` and `FaultQueue` have
/// fully drained, per spec §4.3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemFaultStatus {
    pub system: SystemFaultBits,
    pub handling_errors: FaultHandlingErrorBits,
}

impl SystemFaultStatus {
    pub fn is_overflowed(&self) -> bool {
        self.handling_errors.intersects(FaultHandlingErrorBits::OVERFLOW)
    }

    pub fn is_clear(&self) -> bool {
        self.system.is_empty() && self.handling_errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_bits_mark_status_overflowed() {
        let mut status = SystemFaultStatus::default();
        assert!(!status.is_overflowed());
        status.handling_errors |= FaultHandlingErrorBits::FAULT_BUFFER_OVERFLOW;
        assert!(status.is_overflowed());
    }
}
