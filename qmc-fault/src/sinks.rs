use qmc_datahub::MotorId;

/// Every log event code the fault dispatcher can submit (spec §4.3's
/// `SubmitLogs` bit-by-bit dispatch). `motor_id` is `Some` for the
/// fault-with-id variants, `None` for fault-without-id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultLogEvent {
    NoFaultMc,
    NoFaultBs,
    OverCurrent,
    UnderDcBusVoltage,
    OverDcBusVoltage,
    OverLoad,
    OverSpeed,
    RotorBlocked,
    Gd3000OverTemperature,
    Gd3000Desaturation,
    Gd3000LowVls,
    Gd3000OverCurrent,
    Gd3000PhaseError,
    Gd3000Reset,
    PsbOverTemperature1,
    PsbOverTemperature2,
    AfePsbCommunicationError,
    NoFault,
    DbOverTemperature,
    McuOverTemperature,
    PmicUnderVoltage1,
    PmicUnderVoltage2,
    PmicUnderVoltage3,
    PmicUnderVoltage4,
    PmicOverTemperature,
    EmergencyStop,
    AfeDbCommunicationError,
    DbTempSensCommunicationError,
    FaultBufferOverflow,
    FaultQueueOverflow,
    InvalidFaultSource,
    QueueingCommandFailedQueue,
    RpcFailure,
}

/// Sink for the fault dispatcher's `SubmitLogs` output. The tamper-evident
/// log pipeline (C5) is a sibling crate, wired in by `qmc-app`; tests use
/// `NoopFaultLogSink`.
pub trait FaultLogSink: Send + Sync {
    fn submit(&self, event: FaultLogEvent, motor_id: Option<MotorId>);
}

pub struct NoopFaultLogSink;

impl FaultLogSink for NoopFaultLogSink {
    fn submit(&self, _event: FaultLogEvent, _motor_id: Option<MotorId>) {}
}

/// Sink for the fault dispatcher's two side effects on shared system
/// state that lives in the lifecycle/power orchestrator (C9): the
/// per-motor and system fault bits in the `SystemStatus` event group
/// (spec §3 `SystemStatus`), and `BOARD_SetLifecycle(kQMC_LcError)`,
/// forced whenever the dispatcher stops a motor for a fault or exhausts
/// the stop-command retry budget. `qmc-app` wires the real C9 instance
/// in; tests use `NoopSystemEventSink`.
pub trait SystemEventSink: Send + Sync {
    fn set_motor_fault_bit(&self, motor_id: MotorId);
    fn clear_motor_fault_bit(&self, motor_id: MotorId);
    fn set_system_fault_bit(&self);
    fn clear_system_fault_bit(&self);
    fn force_error_lifecycle(&self);
}

pub struct NoopSystemEventSink;

impl SystemEventSink for NoopSystemEventSink {
    fn set_motor_fault_bit(&self, _motor_id: MotorId) {}
    fn clear_motor_fault_bit(&self, _motor_id: MotorId) {}
    fn set_system_fault_bit(&self) {}
    fn clear_system_fault_bit(&self) {}
    fn force_error_lifecycle(&self) {}
}
