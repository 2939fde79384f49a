//! Task, queue, event-group and timer primitives (spec §4.1, C1) shared
//! by every QMC subsystem crate.

pub mod error;
pub mod event_group;
pub mod kernel;
pub mod queue;
pub mod spsc_ring;
pub mod timer;
pub mod watchdog;

pub use error::{QmcError, QmcResult};
pub use event_group::{EventGroup, WaitMode};
pub use kernel::Kernel;
pub use queue::Queue;
pub use spsc_ring::SpscRing;
pub use timer::Timer;
pub use watchdog::WatchdogRegistry;
