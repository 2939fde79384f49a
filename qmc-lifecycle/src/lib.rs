//! Lifecycle state machine, SNVS-LP-GPR boot handoff, power-loss ISR
//! path, and watchdog orchestration (spec §4.9, C9).

pub mod orchestrator;
pub mod snvs;
pub mod state;
pub mod watchdog;

pub use orchestrator::LifecycleOrchestrator;
pub use snvs::{FileSnvs, FwState, MemSnvs, SnvsLpGpr};
pub use state::{LifecycleState, SystemStatus};
pub use watchdog::{FunctionalWatchdogSupervisor, SecureWatchdog};
