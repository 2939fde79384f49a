//! Fault buffer/queue, stop-policy matrix, and four-plane dispatch
//! (spec §4.3, C3).

pub mod buffer;
pub mod dispatcher;
pub mod policy;
pub mod sinks;
pub mod types;

pub use buffer::{FaultBuffer, FaultQueue};
pub use dispatcher::FaultDispatcher;
pub use policy::StopPolicy;
pub use sinks::{FaultLogEvent, FaultLogSink, NoopFaultLogSink, NoopSystemEventSink, SystemEventSink};
pub use types::{
    FaultHandlingErrorBits, FaultSource, MotorFaultBits, SystemFaultBits, SystemFaultStatus,
};
