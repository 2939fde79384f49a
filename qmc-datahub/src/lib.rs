//! Motor command/status bus bridging the real-time fast control loop with
//! best-effort tasks (spec §4.2, C2).

pub mod datahub;
pub mod shared;
pub mod types;

pub use datahub::{DataHub, DataHubFaultSink, NoopFaultSink, StatusQueueHandle, MAX_STATUS_QUEUES};
pub use shared::{MotorControlMemory, SimulatedMotorControl};
pub use types::{
    MotorCommand, MotorCommandKind, MotorControlMethod, MotorId, MotorPosition, MotorState, MotorStatus, MAX_MOTORS,
};
