use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{error, warn};

use qmc_datahub::{DataHub, MotorCommand, MotorCommandKind, MotorControlMethod, MotorId, MAX_MOTORS};
use qmc_kernel::error::QmcResult;
use qmc_kernel::Timer;

use crate::buffer::{FaultBuffer, FaultQueue};
use crate::policy::StopPolicy;
use crate::sinks::{FaultLogEvent, FaultLogSink, SystemEventSink};
use crate::types::{FaultHandlingErrorBits, FaultSource, MotorFaultBits, SystemFaultBits, SystemFaultStatus};

/// How long a reported fault-handling error (AFE/RPC comms, or either
/// overflow bit) is suppressed from re-logging once reported, grounded
/// on `fault_handling_tasks.c`'s `ERROR_LOG_PERIOD_IN_SECONDS`.
const ERROR_LOG_PERIOD: Duration = Duration::from_secs(300);

/// Retry budget for `StopMotorsPerConfiguration`/`StopAllMotors` queueing
/// a stop command against a motor whose command queue is momentarily
/// full, grounded on `fault_handling_tasks.c`'s `MOTOR_QUEUE_TIMEOUT_ATTEMPTS`.
const MOTOR_QUEUE_TIMEOUT_ATTEMPTS: u32 = 20;
const MOTOR_QUEUE_RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Plane {
    Mc,
    Bs,
}

/// The fault subsystem's dispatch loop (spec §4.3, C3): drains
/// `FaultBuffer` before `FaultQueue`, partitions each event's bitmask
/// into the four disjoint planes, applies the stop-policy matrix, and
/// forwards to the log pipeline and lifecycle orchestrator through
/// their seam traits.
pub struct FaultDispatcher {
    buffer: FaultBuffer,
    queue: FaultQueue,
    notify: Notify,
    stop_policy: StopPolicy,
    status: Mutex<SystemFaultStatus>,
    mc_no_fault: Mutex<[bool; MAX_MOTORS]>,
    bs_no_fault: Mutex<[bool; MAX_MOTORS]>,
    /// Set when a system-plane `NoFault` clear was requested while an
    /// overflow bit was still sticky; replayed once the overflow clears.
    system_clear_pending: AtomicBool,
    already_reported: Arc<Mutex<FaultHandlingErrorBits>>,
    afe_already_reported: Arc<Mutex<[bool; MAX_MOTORS]>>,
    suppression_armed: Arc<AtomicBool>,
    error_log_timer: Mutex<Option<Timer>>,
    datahub: Arc<DataHub>,
    log_sink: Arc<dyn FaultLogSink>,
    event_sink: Arc<dyn SystemEventSink>,
}

impl FaultDispatcher {
    pub fn new(
        buffer_capacity: usize,
        queue_capacity: usize,
        datahub: Arc<DataHub>,
        log_sink: Arc<dyn FaultLogSink>,
        event_sink: Arc<dyn SystemEventSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            buffer: FaultBuffer::new(buffer_capacity),
            queue: FaultQueue::new(queue_capacity),
            notify: Notify::new(),
            stop_policy: StopPolicy::new(),
            status: Mutex::new(SystemFaultStatus::default()),
            mc_no_fault: Mutex::new([true; MAX_MOTORS]),
            bs_no_fault: Mutex::new([true; MAX_MOTORS]),
            system_clear_pending: AtomicBool::new(false),
            already_reported: Arc::new(Mutex::new(FaultHandlingErrorBits::empty())),
            afe_already_reported: Arc::new(Mutex::new([false; MAX_MOTORS])),
            suppression_armed: Arc::new(AtomicBool::new(false)),
            error_log_timer: Mutex::new(None),
            datahub,
            log_sink,
            event_sink,
        })
    }

    /// ISR-context raise (`fault_raise_isr`): lock-free push into
    /// `FaultBuffer`, sticky overflow bit on failure.
    pub fn fault_raise_isr(&self, src: FaultSource) {
        if self.buffer.push(src).is_err() {
            self.status.lock().unwrap().handling_errors |= FaultHandlingErrorBits::FAULT_BUFFER_OVERFLOW;
        }
        self.notify.notify_one();
    }

    /// Task-context raise (`fault_raise`): blocking-capacity push into
    /// `FaultQueue`.
    pub async fn fault_raise(&self, src: FaultSource) -> QmcResult<()> {
        let result = self.queue.push(src).await;
        if result.is_err() {
            self.status.lock().unwrap().handling_errors |= FaultHandlingErrorBits::FAULT_QUEUE_OVERFLOW;
        }
        self.notify.notify_one();
        result
    }

    pub fn fault_get_system_fault(&self) -> SystemFaultStatus {
        *self.status.lock().unwrap()
    }

    pub fn fault_get_immediate_stop_config(&self, fault_motor: MotorId, victim_motor: MotorId) -> bool {
        self.stop_policy.should_stop(fault_motor, victim_motor)
    }

    pub fn set_immediate_stop_config(&self, fault_motor: MotorId, victim_motor: MotorId, stop: bool) {
        self.stop_policy.set(fault_motor, victim_motor, stop);
    }

    /// The dispatcher's main loop: one task, spawned by `qmc-app`.
    pub async fn run(self: Arc<Self>) {
        loop {
            if let Some(src) = self.buffer.pop() {
                self.handle(src).await;
                continue;
            }
            self.status.lock().unwrap().handling_errors.remove(FaultHandlingErrorBits::FAULT_BUFFER_OVERFLOW);

            if let Some(src) = self.queue.pop_nonblocking().await {
                self.handle(src).await;
                continue;
            }
            self.status.lock().unwrap().handling_errors.remove(FaultHandlingErrorBits::FAULT_QUEUE_OVERFLOW);

            self.replay_deferred_no_fault();
            self.notify.notified().await;
        }
    }

    async fn handle(&self, src: FaultSource) {
        if let Some(bits) = src.mc_fault {
            self.handle_motor_plane(src.motor_id, bits, Plane::Mc).await;
        }
        if let Some(bits) = src.bs_fault {
            self.handle_motor_plane(src.motor_id, bits, Plane::Bs).await;
        }
        if let Some(bits) = src.system_fault {
            self.handle_system_plane(bits).await;
        }
        if let Some(bits) = src.handling_error {
            self.handle_handling_error_plane(src.motor_id, bits);
        }
        if src.invalid {
            self.log_sink.submit(FaultLogEvent::InvalidFaultSource, Some(src.motor_id));
        }
    }

    async fn handle_motor_plane(&self, motor_id: MotorId, bits: MotorFaultBits, plane: Plane) {
        let idx = motor_id.get() as usize;
        let (own, other) = match plane {
            Plane::Mc => (&self.mc_no_fault, &self.bs_no_fault),
            Plane::Bs => (&self.bs_no_fault, &self.mc_no_fault),
        };

        if bits.is_empty() {
            let other_clear = other.lock().unwrap()[idx];
            own.lock().unwrap()[idx] = true;
            if other_clear {
                self.event_sink.clear_motor_fault_bit(motor_id);
            }
            self.log_sink.submit(
                match plane {
                    Plane::Mc => FaultLogEvent::NoFaultMc,
                    Plane::Bs => FaultLogEvent::NoFaultBs,
                },
                Some(motor_id),
            );
            return;
        }

        self.stop_motors_per_policy(motor_id).await;
        own.lock().unwrap()[idx] = false;
        self.event_sink.set_motor_fault_bit(motor_id);
        self.event_sink.force_error_lifecycle();
        self.submit_logs_motor(bits, motor_id);
    }

    async fn handle_system_plane(&self, bits: SystemFaultBits) {
        if bits.is_empty() {
            let overflowed = self.status.lock().unwrap().is_overflowed();
            if overflowed {
                self.system_clear_pending.store(true, Ordering::Relaxed);
                return;
            }
            self.status.lock().unwrap().system = SystemFaultBits::empty();
            self.event_sink.clear_system_fault_bit();
            self.log_sink.submit(FaultLogEvent::NoFault, None);
            return;
        }

        self.stop_all_motors().await;
        self.status.lock().unwrap().system |= bits;
        self.event_sink.set_system_fault_bit();
        self.event_sink.force_error_lifecycle();
        self.system_clear_pending.store(false, Ordering::Relaxed);
        self.submit_logs_system(bits);
    }

    fn handle_handling_error_plane(&self, motor_id: MotorId, bits: FaultHandlingErrorBits) {
        self.status.lock().unwrap().handling_errors |= bits;
        self.event_sink.set_system_fault_bit();

        let idx = motor_id.get() as usize;
        let is_pure_afe = bits == FaultHandlingErrorBits::AFE_PSB_COMMUNICATION_ERROR;
        let afe_already = self.afe_already_reported.lock().unwrap()[idx];
        let any_reported = !self.already_reported.lock().unwrap().is_empty();

        let should_log = (is_pure_afe && !afe_already) || !any_reported;
        if !should_log {
            return;
        }

        if is_pure_afe {
            self.afe_already_reported.lock().unwrap()[idx] = true;
            self.log_sink.submit(FaultLogEvent::AfePsbCommunicationError, Some(motor_id));
        }
        if bits.contains(FaultHandlingErrorBits::RPC_FAILURE) {
            self.log_sink.submit(FaultLogEvent::RpcFailure, Some(motor_id));
        }
        *self.already_reported.lock().unwrap() |= bits;
        self.arm_error_log_suppression();
    }

    /// Once `already_reported`'s suppression window lapses, any
    /// still-set handling-error bit can be logged again
    /// (`errorLogTimerCallback`).
    fn arm_error_log_suppression(&self) {
        if self.suppression_armed.swap(true, Ordering::SeqCst) {
            return;
        }
        let already_reported = self.already_reported.clone();
        let afe_already_reported = self.afe_already_reported.clone();
        let armed = self.suppression_armed.clone();
        *self.error_log_timer.lock().unwrap() = Some(Timer::start(ERROR_LOG_PERIOD, false, move || {
            let already_reported = already_reported.clone();
            let afe_already_reported = afe_already_reported.clone();
            let armed = armed.clone();
            async move {
                *already_reported.lock().unwrap() = FaultHandlingErrorBits::empty();
                *afe_already_reported.lock().unwrap() = [false; MAX_MOTORS];
                armed.store(false, Ordering::SeqCst);
            }
        }));
    }

    fn replay_deferred_no_fault(&self) {
        if !self.system_clear_pending.swap(false, Ordering::Relaxed) {
            return;
        }
        let mut status = self.status.lock().unwrap();
        if status.is_overflowed() {
            self.system_clear_pending.store(true, Ordering::Relaxed);
            return;
        }
        status.system = SystemFaultBits::empty();
        drop(status);
        self.event_sink.clear_system_fault_bit();
        self.log_sink.submit(FaultLogEvent::NoFault, None);
    }

    fn submit_logs_motor(&self, bits: MotorFaultBits, motor_id: MotorId) {
        const TABLE: &[(MotorFaultBits, FaultLogEvent)] = &[
            (MotorFaultBits::OVER_CURRENT, FaultLogEvent::OverCurrent),
            (MotorFaultBits::UNDER_DC_BUS_VOLTAGE, FaultLogEvent::UnderDcBusVoltage),
            (MotorFaultBits::OVER_DC_BUS_VOLTAGE, FaultLogEvent::OverDcBusVoltage),
            (MotorFaultBits::OVER_LOAD, FaultLogEvent::OverLoad),
            (MotorFaultBits::OVER_SPEED, FaultLogEvent::OverSpeed),
            (MotorFaultBits::ROTOR_BLOCKED, FaultLogEvent::RotorBlocked),
            (MotorFaultBits::GD3000_OVER_TEMPERATURE, FaultLogEvent::Gd3000OverTemperature),
            (MotorFaultBits::GD3000_DESATURATION, FaultLogEvent::Gd3000Desaturation),
            (MotorFaultBits::GD3000_LOW_VLS, FaultLogEvent::Gd3000LowVls),
            (MotorFaultBits::GD3000_OVER_CURRENT, FaultLogEvent::Gd3000OverCurrent),
            (MotorFaultBits::GD3000_PHASE_ERROR, FaultLogEvent::Gd3000PhaseError),
            (MotorFaultBits::GD3000_RESET, FaultLogEvent::Gd3000Reset),
            (MotorFaultBits::PSB_OVER_TEMPERATURE_1, FaultLogEvent::PsbOverTemperature1),
            (MotorFaultBits::PSB_OVER_TEMPERATURE_2, FaultLogEvent::PsbOverTemperature2),
        ];
        for &(bit, event) in TABLE {
            if bits.contains(bit) {
                self.log_sink.submit(event, Some(motor_id));
            }
        }
    }

    fn submit_logs_system(&self, bits: SystemFaultBits) {
        const TABLE: &[(SystemFaultBits, FaultLogEvent)] = &[
            (SystemFaultBits::DB_OVER_TEMPERATURE, FaultLogEvent::DbOverTemperature),
            (SystemFaultBits::MCU_OVER_TEMPERATURE, FaultLogEvent::McuOverTemperature),
            (SystemFaultBits::PMIC_UNDER_VOLTAGE_1, FaultLogEvent::PmicUnderVoltage1),
            (SystemFaultBits::PMIC_UNDER_VOLTAGE_2, FaultLogEvent::PmicUnderVoltage2),
            (SystemFaultBits::PMIC_UNDER_VOLTAGE_3, FaultLogEvent::PmicUnderVoltage3),
            (SystemFaultBits::PMIC_UNDER_VOLTAGE_4, FaultLogEvent::PmicUnderVoltage4),
            (SystemFaultBits::PMIC_OVER_TEMPERATURE, FaultLogEvent::PmicOverTemperature),
            (SystemFaultBits::EMERGENCY_STOP, FaultLogEvent::EmergencyStop),
            (SystemFaultBits::AFE_DB_COMMUNICATION_ERROR, FaultLogEvent::AfeDbCommunicationError),
            (SystemFaultBits::DB_TEMP_SENS_COMMUNICATION_ERROR, FaultLogEvent::DbTempSensCommunicationError),
        ];
        for &(bit, event) in TABLE {
            if bits.contains(bit) {
                self.log_sink.submit(event, None);
            }
        }
    }

    /// `StopMotorsPerConfiguration`: stop every motor the stop-policy
    /// matrix marks as affected by a fault on `fault_motor`.
    async fn stop_motors_per_policy(&self, fault_motor: MotorId) {
        for victim in self.stop_policy.affected_motors(fault_motor) {
            self.stop_motor_with_retry(victim).await;
        }
    }

    /// `StopAllMotors`: a system-plane fault stops every motor
    /// unconditionally.
    async fn stop_all_motors(&self) {
        for victim in MotorId::all() {
            self.stop_motor_with_retry(victim).await;
        }
    }

    async fn stop_motor_with_retry(&self, motor_id: MotorId) {
        let command = MotorCommand {
            motor_id,
            kind: MotorCommandKind::FreezeAndStop,
            method: MotorControlMethod::FocSpeed { speed: 0.0 },
        };
        for attempt in 0..MOTOR_QUEUE_TIMEOUT_ATTEMPTS {
            match self.datahub.queue_command(command).await {
                Ok(()) => return,
                Err(_) if attempt + 1 < MOTOR_QUEUE_TIMEOUT_ATTEMPTS => sleep(MOTOR_QUEUE_RETRY_DELAY).await,
                Err(e) => {
                    error!(?motor_id, error = ?e, "exhausted stop-command retry budget");
                    self.log_sink.submit(FaultLogEvent::QueueingCommandFailedQueue, Some(motor_id));
                    self.event_sink.force_error_lifecycle();
                    return;
                }
            }
        }
        warn!(?motor_id, "stop command retried to exhaustion without a terminal error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qmc_datahub::SimulatedMotorControl;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingLogSink {
        events: StdMutex<Vec<(FaultLogEvent, Option<MotorId>)>>,
    }

    impl FaultLogSink for RecordingLogSink {
        fn submit(&self, event: FaultLogEvent, motor_id: Option<MotorId>) {
            self.events.lock().unwrap().push((event, motor_id));
        }
    }

    #[derive(Default)]
    struct RecordingEventSink {
        system_set: StdMutex<bool>,
        motor_set: StdMutex<[bool; MAX_MOTORS]>,
        lifecycle_errors: StdMutex<u32>,
    }

    impl SystemEventSink for RecordingEventSink {
        fn set_motor_fault_bit(&self, motor_id: MotorId) {
            self.motor_set.lock().unwrap()[motor_id.get() as usize] = true;
        }
        fn clear_motor_fault_bit(&self, motor_id: MotorId) {
            self.motor_set.lock().unwrap()[motor_id.get() as usize] = false;
        }
        fn set_system_fault_bit(&self) {
            *self.system_set.lock().unwrap() = true;
        }
        fn clear_system_fault_bit(&self) {
            *self.system_set.lock().unwrap() = false;
        }
        fn force_error_lifecycle(&self) {
            *self.lifecycle_errors.lock().unwrap() += 1;
        }
    }

    fn new_dispatcher() -> (Arc<FaultDispatcher>, Arc<RecordingLogSink>, Arc<RecordingEventSink>) {
        let mc = Arc::new(SimulatedMotorControl::default());
        let datahub = DataHub::new(mc);
        let log_sink = Arc::new(RecordingLogSink::default());
        let event_sink = Arc::new(RecordingEventSink::default());
        let dispatcher = FaultDispatcher::new(8, 8, datahub, log_sink.clone(), event_sink.clone());
        (dispatcher, log_sink, event_sink)
    }

    #[tokio::test]
    async fn motor_mc_fault_sets_bit_and_stops_self() {
        let (dispatcher, log_sink, event_sink) = new_dispatcher();
        let motor = MotorId::new(0).unwrap();
        dispatcher
            .handle_motor_plane(motor, MotorFaultBits::OVER_CURRENT, Plane::Mc)
            .await;
        assert!(event_sink.motor_set.lock().unwrap()[0]);
        assert_eq!(*event_sink.lifecycle_errors.lock().unwrap(), 1);
        assert!(log_sink
            .events
            .lock()
            .unwrap()
            .contains(&(FaultLogEvent::OverCurrent, Some(motor))));
    }

    #[tokio::test]
    async fn motor_fault_clears_only_once_both_planes_clear() {
        let (dispatcher, _log_sink, event_sink) = new_dispatcher();
        let motor = MotorId::new(1).unwrap();
        dispatcher
            .handle_motor_plane(motor, MotorFaultBits::OVER_LOAD, Plane::Mc)
            .await;
        dispatcher
            .handle_motor_plane(motor, MotorFaultBits::ROTOR_BLOCKED, Plane::Bs)
            .await;
        assert!(event_sink.motor_set.lock().unwrap()[1]);

        dispatcher.handle_motor_plane(motor, MotorFaultBits::empty(), Plane::Mc).await;
        assert!(event_sink.motor_set.lock().unwrap()[1], "still faulted: BS plane hasn't cleared");

        dispatcher.handle_motor_plane(motor, MotorFaultBits::empty(), Plane::Bs).await;
        assert!(!event_sink.motor_set.lock().unwrap()[1]);
    }

    #[tokio::test]
    async fn system_fault_stops_all_motors_and_sets_bit() {
        let (dispatcher, log_sink, event_sink) = new_dispatcher();
        dispatcher.handle_system_plane(SystemFaultBits::EMERGENCY_STOP).await;
        assert!(*event_sink.system_set.lock().unwrap());
        assert!(log_sink
            .events
            .lock()
            .unwrap()
            .contains(&(FaultLogEvent::EmergencyStop, None)));
        assert!(dispatcher.fault_get_system_fault().system.contains(SystemFaultBits::EMERGENCY_STOP));
    }

    #[tokio::test]
    async fn system_fault_clear_is_deferred_while_overflowed() {
        let (dispatcher, log_sink, event_sink) = new_dispatcher();
        dispatcher.status.lock().unwrap().handling_errors |= FaultHandlingErrorBits::FAULT_BUFFER_OVERFLOW;

        dispatcher.handle_system_plane(SystemFaultBits::empty()).await;
        assert!(!*event_sink.system_set.lock().unwrap());
        assert!(dispatcher.system_clear_pending.load(Ordering::SeqCst));

        dispatcher.status.lock().unwrap().handling_errors.remove(FaultHandlingErrorBits::FAULT_BUFFER_OVERFLOW);
        dispatcher.replay_deferred_no_fault();
        assert!(log_sink.events.lock().unwrap().contains(&(FaultLogEvent::NoFault, None)));
    }

    #[tokio::test]
    async fn isr_raise_overflow_sets_sticky_bit() {
        let (dispatcher, _log_sink, _event_sink) = new_dispatcher();
        for i in 0..8 {
            dispatcher.fault_raise_isr(FaultSource::motor_mc(MotorId::new(0).unwrap(), MotorFaultBits::from_bits_truncate(i)));
        }
        dispatcher.fault_raise_isr(FaultSource::motor_mc(MotorId::new(0).unwrap(), MotorFaultBits::OVER_CURRENT));
        assert!(dispatcher.fault_get_system_fault().is_overflowed());
    }

    #[tokio::test]
    async fn handling_error_plane_rate_limits_repeat_afe_logs() {
        let (dispatcher, log_sink, _event_sink) = new_dispatcher();
        let motor = MotorId::new(0).unwrap();
        dispatcher.handle_handling_error_plane(motor, FaultHandlingErrorBits::AFE_PSB_COMMUNICATION_ERROR);
        dispatcher.handle_handling_error_plane(motor, FaultHandlingErrorBits::AFE_PSB_COMMUNICATION_ERROR);
        let count = log_sink
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == FaultLogEvent::AfePsbCommunicationError)
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn stop_policy_affects_configured_victim_motor() {
        let (dispatcher, _log_sink, event_sink) = new_dispatcher();
        let a = MotorId::new(0).unwrap();
        let b = MotorId::new(1).unwrap();
        dispatcher.set_immediate_stop_config(a, b, true);
        dispatcher.handle_motor_plane(a, MotorFaultBits::OVER_CURRENT, Plane::Mc).await;
        assert!(event_sink.motor_set.lock().unwrap()[0]);
    }
}
