use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use qmc_kernel::error::{QmcError, QmcResult};
use qmc_kernel::{EventGroup, Queue, Timer, WaitMode};

use crate::shared::MotorControlMemory;
use crate::types::{MotorCommand, MotorCommandKind, MotorId, MotorStatus, MAX_MOTORS};

/// `DATAHUB_MAX_STATUS_QUEUES` (spec §4.2): capped well under the 22-slot
/// ceiling the original enforces ("24 event bits, minus one for the
/// command queue").
pub const MAX_STATUS_QUEUES: usize = 8;

const COMMAND_QUEUE_DEPTH: usize = 8;
const STATUS_QUEUE_DEPTH: usize = 16;

const EVENTBIT_COMMAND_QUEUE: u32 = 1 << 0;
const EVENTBIT_STATUS_TIMER: u32 = 1 << 1;

/// Long enough to behave as "wait forever" without overflowing
/// `Instant + Duration` arithmetic.
const FOREVER: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Opaque handle to one registered status-subscriber slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusQueueHandle(usize);

/// Sink for the `QueueingCommandFailedInternal` fault-with-id log entry
/// the DataHub task emits when `set_motor_command` fails for a reason
/// other than `Interrupted`/`Busy` (spec §4.2). The tamper-evident log
/// pipeline (C5) is a sibling crate, not a dependency of this one, so
/// `qmc-app` wires a concrete sink in at startup; tests use `NoopFaultSink`.
pub trait DataHubFaultSink: Send + Sync {
    fn queueing_command_failed_internal(&self, motor: MotorId);
}

pub struct NoopFaultSink;

impl DataHubFaultSink for NoopFaultSink {
    fn queueing_command_failed_internal(&self, _motor: MotorId) {}
}

struct StatusSlot {
    queue: Arc<Queue<MotorStatus>>,
    prescaler: u32,
    counter: u32,
}

/// The motor command/status bus bridging the fast control loop with
/// best-effort tasks (spec §4.2, C2): one inbound command queue, up to
/// `MAX_STATUS_QUEUES` decimated outbound status queues.
pub struct DataHub {
    command_queue: Arc<Queue<MotorCommand>>,
    events: Arc<EventGroup>,
    slots: Mutex<[Option<StatusSlot>; MAX_STATUS_QUEUES]>,
    tsn_injection: AtomicBool,
    mc: Arc<dyn MotorControlMemory>,
    fault_sink: Arc<dyn DataHubFaultSink>,
}

impl DataHub {
    pub fn new(mc: Arc<dyn MotorControlMemory>) -> Arc<Self> {
        Self::with_fault_sink(mc, Arc::new(NoopFaultSink))
    }

    pub fn with_fault_sink(mc: Arc<dyn MotorControlMemory>, fault_sink: Arc<dyn DataHubFaultSink>) -> Arc<Self> {
        Arc::new(Self {
            command_queue: Queue::new(COMMAND_QUEUE_DEPTH),
            events: EventGroup::new(),
            slots: Mutex::new(std::array::from_fn(|_| None)),
            tsn_injection: AtomicBool::new(false),
            mc,
            fault_sink,
        })
    }

    /// `mc_queue_command` (spec §4.2): `Busy` if the target motor is
    /// currently frozen, `NoMem` if the inbound queue is full.
    pub async fn queue_command(&self, cmd: MotorCommand) -> QmcResult<()> {
        if self.mc.is_frozen(cmd.motor_id) {
            return Err(QmcError::Busy);
        }
        self.command_queue.send(cmd, Duration::ZERO).await?;
        self.events.set(EVENTBIT_COMMAND_QUEUE);
        Ok(())
    }

    /// The TSN stream's entry point into the same inbound queue;
    /// rejected with `Err` while injection is gated off
    /// (`mc_set_tsn_command_injection`, spec §4.2).
    pub async fn queue_command_from_tsn(&self, cmd: MotorCommand) -> QmcResult<()> {
        if !self.tsn_injection.load(Ordering::SeqCst) {
            return Err(QmcError::Err);
        }
        self.queue_command(cmd).await
    }

    pub fn set_tsn_command_injection(&self, on: bool) {
        self.tsn_injection.store(on, Ordering::SeqCst);
    }

    pub fn is_tsn_command_injection_enabled(&self) -> bool {
        self.tsn_injection.load(Ordering::SeqCst)
    }

    /// `mc_unfreeze_motor` (spec §4.2): clears the Freeze latch.
    pub fn unfreeze_motor(&self, id: MotorId) {
        self.mc.set_frozen(id, false);
    }

    /// `mc_get_new_status_queue` (spec §4.2): allocates a decimated
    /// status subscription. `prescaler` must be at least 1.
    pub async fn get_new_status_queue(&self, prescaler: u32) -> QmcResult<StatusQueueHandle> {
        if prescaler == 0 {
            return Err(QmcError::ArgInvalid);
        }
        let mut slots = self.slots.lock().await;
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(StatusSlot {
                    queue: Queue::new(STATUS_QUEUE_DEPTH),
                    prescaler,
                    counter: prescaler,
                });
                return Ok(StatusQueueHandle(i));
            }
        }
        Err(QmcError::NoMem)
    }

    /// `mc_return_status_queue`: releases the slot and flushes any
    /// undelivered status samples.
    pub async fn return_status_queue(&self, handle: StatusQueueHandle) -> QmcResult<()> {
        let mut slots = self.slots.lock().await;
        let slot = slots
            .get_mut(handle.0)
            .and_then(|s| s.take())
            .ok_or(QmcError::ArgInvalid)?;
        slot.queue.drain().await;
        Ok(())
    }

    /// `mc_dequeue_status`: `NoMsg` (via the queue's own timeout path) if
    /// nothing has arrived within `to`.
    pub async fn dequeue_status(&self, handle: StatusQueueHandle, to: Duration) -> QmcResult<MotorStatus> {
        let queue = {
            let slots = self.slots.lock().await;
            slots
                .get(handle.0)
                .and_then(|s| s.as_ref())
                .map(|s| s.queue.clone())
                .ok_or(QmcError::ArgInvalid)?
        };
        queue.recv(to).await
    }

    async fn process_command_event(&self) {
        let Some(cmd) = self.command_queue.peek().await else {
            self.events.clear(EVENTBIT_COMMAND_QUEUE);
            return;
        };
        let result = self.mc.set_motor_command(&cmd);
        if matches!(result, Err(QmcError::Interrupted)) {
            // Left in the queue for retry on the next command event.
            return;
        }
        self.command_queue.pop_front_discard().await;
        if self.command_queue.is_empty().await {
            self.events.clear(EVENTBIT_COMMAND_QUEUE);
        }
        match result {
            Ok(()) | Err(QmcError::Busy) => {}
            Err(_) => self.fault_sink.queueing_command_failed_internal(cmd.motor_id),
        }
    }

    async fn process_status_tick(&self) {
        let samples: Vec<MotorStatus> = MotorId::all().map(|id| self.mc.get_motor_status(id)).collect();
        debug_assert_eq!(samples.len(), MAX_MOTORS);

        let mut slots = self.slots.lock().await;
        for slot in slots.iter_mut().flatten() {
            slot.counter -= 1;
            if slot.counter == 0 {
                slot.counter = slot.prescaler;
                for status in &samples {
                    // Status is best-effort: a full subscriber queue is
                    // dropped silently (spec §4.2 failure semantics).
                    let _ = slot.queue.send(*status, Duration::ZERO).await;
                }
            }
        }
        drop(slots);
        self.events.clear(EVENTBIT_STATUS_TIMER);
    }

    /// The DataHub task body (spec §4.2 algorithm): wakes on either the
    /// command-queue or the sampling-timer event bit and services both.
    /// Runs until cancelled.
    pub async fn run(self: Arc<Self>, sampling_period: Duration) {
        let events = self.events.clone();
        let _sampling_timer = Timer::start(sampling_period, true, move || {
            let events = events.clone();
            async move { events.set(EVENTBIT_STATUS_TIMER) }
        });

        loop {
            let bits = match self
                .events
                .wait(EVENTBIT_COMMAND_QUEUE | EVENTBIT_STATUS_TIMER, WaitMode::Any, false, FOREVER)
                .await
            {
                Ok(bits) => bits,
                Err(_) => continue,
            };
            if bits & EVENTBIT_COMMAND_QUEUE != 0 {
                self.process_command_event().await;
            }
            if bits & EVENTBIT_STATUS_TIMER != 0 {
                self.process_status_tick().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::SimulatedMotorControl;
    use crate::types::MotorControlMethod;

    fn cmd(id: u8, kind: MotorCommandKind) -> MotorCommand {
        MotorCommand {
            motor_id: MotorId::new(id).unwrap(),
            kind,
            method: MotorControlMethod::FocSpeed { speed: 0.0 },
        }
    }

    #[tokio::test]
    async fn queue_command_then_apply_updates_status() {
        let mc = Arc::new(SimulatedMotorControl::default());
        let hub = DataHub::new(mc.clone());
        hub.queue_command(cmd(0, MotorCommandKind::On)).await.unwrap();
        hub.process_command_event().await;
        assert_eq!(mc.get_motor_status(MotorId::new(0).unwrap()).state, crate::types::MotorState::Run);
    }

    #[tokio::test]
    async fn queue_command_on_frozen_motor_is_busy() {
        let mc = Arc::new(SimulatedMotorControl::default());
        mc.set_frozen(MotorId::new(1).unwrap(), true);
        let hub = DataHub::new(mc);
        let err = hub.queue_command(cmd(1, MotorCommandKind::On)).await.unwrap_err();
        assert_eq!(err, QmcError::Busy);
    }

    #[tokio::test]
    async fn tsn_injection_gated_off_by_default() {
        let mc = Arc::new(SimulatedMotorControl::default());
        let hub = DataHub::new(mc);
        let err = hub.queue_command_from_tsn(cmd(0, MotorCommandKind::On)).await.unwrap_err();
        assert_eq!(err, QmcError::Err);
        hub.set_tsn_command_injection(true);
        hub.queue_command_from_tsn(cmd(0, MotorCommandKind::On)).await.unwrap();
    }

    #[tokio::test]
    async fn status_queue_allocation_exhausts_then_frees() {
        let mc = Arc::new(SimulatedMotorControl::default());
        let hub = DataHub::new(mc);
        let mut handles = Vec::new();
        for _ in 0..MAX_STATUS_QUEUES {
            handles.push(hub.get_new_status_queue(1).await.unwrap());
        }
        assert_eq!(hub.get_new_status_queue(1).await.unwrap_err(), QmcError::NoMem);
        hub.return_status_queue(handles.pop().unwrap()).await.unwrap();
        hub.get_new_status_queue(1).await.unwrap();
    }

    #[tokio::test]
    async fn status_tick_delivers_four_samples_per_prescaler_period() {
        let mc = Arc::new(SimulatedMotorControl::default());
        let hub = DataHub::new(mc);
        let handle = hub.get_new_status_queue(1).await.unwrap();
        hub.process_status_tick().await;
        for _ in 0..MAX_MOTORS {
            hub.dequeue_status(handle, Duration::ZERO).await.unwrap();
        }
        assert_eq!(hub.dequeue_status(handle, Duration::ZERO).await.unwrap_err(), QmcError::NoMsg);
    }

    #[tokio::test]
    async fn prescaler_decimates_delivery() {
        let mc = Arc::new(SimulatedMotorControl::default());
        let hub = DataHub::new(mc);
        let handle = hub.get_new_status_queue(2).await.unwrap();
        hub.process_status_tick().await;
        assert_eq!(hub.dequeue_status(handle, Duration::ZERO).await.unwrap_err(), QmcError::NoMsg);
        hub.process_status_tick().await;
        hub.dequeue_status(handle, Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn unfreeze_motor_clears_latch() {
        let mc = Arc::new(SimulatedMotorControl::default());
        let id = MotorId::new(2).unwrap();
        mc.set_frozen(id, true);
        let hub = DataHub::new(mc.clone());
        hub.unfreeze_motor(id);
        assert!(!mc.is_frozen(id));
    }
}
