use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};

use qmc_board::{BoardTransport, Gd3000Status, SpiDevice};
use qmc_datahub::{DataHubFaultSink, MotorId};
use qmc_fault::{FaultLogEvent, FaultLogSink, SystemEventSink};
use qmc_kernel::error::{QmcError, QmcResult};
use qmc_lifecycle::LifecycleOrchestrator;
use qmc_log::{LogCategoryId, LogEventCode, LogRecord, LogRecordData, LogService, LogSourceId, LogTimestamp, RecordHead};

fn now() -> LogTimestamp {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    LogTimestamp::new(d.as_secs(), d.subsec_millis() as u16)
}

fn spawn_log(log: Arc<LogService>, record: LogRecord) {
    tokio::spawn(async move {
        let _ = log.queue_entry(record, false).await;
    });
}

/// Bridges the fault dispatcher's `SubmitLogs` output (spec §4.3) into
/// the tamper-evident log pipeline (C5). Sync trait methods cross into
/// the async `LogService::queue_entry` the same way `FaultDispatcher`
/// itself bridges ISR-context calls into its task-owned queue: a
/// fire-and-forget `tokio::spawn`.
pub struct LogFaultSink {
    log: Arc<LogService>,
}

impl LogFaultSink {
    pub fn new(log: Arc<LogService>) -> Arc<Self> {
        Arc::new(Self { log })
    }
}

impl FaultLogSink for LogFaultSink {
    fn submit(&self, event: FaultLogEvent, motor_id: Option<MotorId>) {
        let event_code = map_fault_event(event);
        let data = match motor_id {
            Some(id) => LogRecordData::FaultWithId {
                source: LogSourceId::FaultHandling,
                category: LogCategoryId::Fault,
                event_code,
                id: id.get(),
            },
            None => LogRecordData::FaultWithoutId { source: LogSourceId::FaultHandling, category: LogCategoryId::Fault, event_code },
        };
        let record = LogRecord { head: RecordHead { checksum: 0, uuid: 0, timestamp: now() }, data };
        spawn_log(self.log.clone(), record);
    }
}

fn map_fault_event(event: FaultLogEvent) -> LogEventCode {
    use FaultLogEvent::*;
    match event {
        NoFaultMc => LogEventCode::NoFaultMc,
        NoFaultBs => LogEventCode::NoFaultBs,
        OverCurrent => LogEventCode::OverCurrent,
        UnderDcBusVoltage => LogEventCode::UnderDcBusVoltage,
        OverDcBusVoltage => LogEventCode::OverDcBusVoltage,
        OverLoad => LogEventCode::OverLoad,
        OverSpeed => LogEventCode::OverSpeed,
        RotorBlocked => LogEventCode::RotorBlocked,
        Gd3000OverTemperature => LogEventCode::Gd3000OverTemperature,
        Gd3000Desaturation => LogEventCode::Gd3000Desaturation,
        Gd3000LowVls => LogEventCode::Gd3000LowVls,
        Gd3000OverCurrent => LogEventCode::Gd3000OverCurrent,
        Gd3000PhaseError => LogEventCode::Gd3000PhaseError,
        Gd3000Reset => LogEventCode::Gd3000Reset,
        PsbOverTemperature1 => LogEventCode::PsbOverTemperature1,
        PsbOverTemperature2 => LogEventCode::PsbOverTemperature2,
        AfePsbCommunicationError => LogEventCode::AfePsbCommunicationError,
        NoFault => LogEventCode::NoFault,
        DbOverTemperature => LogEventCode::DbOverTemperature,
        McuOverTemperature => LogEventCode::McuOverTemperature,
        PmicUnderVoltage1 | PmicUnderVoltage2 | PmicUnderVoltage3 | PmicUnderVoltage4 => LogEventCode::PmicUnderVoltage,
        PmicOverTemperature => LogEventCode::PmicOverTemperature,
        EmergencyStop => LogEventCode::EmergencyStop,
        AfeDbCommunicationError => LogEventCode::AfeDbCommunicationError,
        DbTempSensCommunicationError => LogEventCode::DbTempSensCommunicationError,
        FaultBufferOverflow => LogEventCode::FaultBufferOverflow,
        FaultQueueOverflow => LogEventCode::FaultQueueOverflow,
        InvalidFaultSource => LogEventCode::InvalidFaultSource,
        QueueingCommandFailedQueue => LogEventCode::QueueingCommandFailedQueue,
        RpcFailure => LogEventCode::RpcCallFailed,
    }
}

/// Bridges `DataHub`'s `QueueingCommandFailedInternal` fault (spec §4.2)
/// into the log pipeline.
pub struct DataHubLogSink {
    log: Arc<LogService>,
}

impl DataHubLogSink {
    pub fn new(log: Arc<LogService>) -> Arc<Self> {
        Arc::new(Self { log })
    }
}

impl DataHubFaultSink for DataHubLogSink {
    fn queueing_command_failed_internal(&self, motor: MotorId) {
        let record = LogRecord {
            head: RecordHead { checksum: 0, uuid: 0, timestamp: now() },
            data: LogRecordData::FaultWithId {
                source: LogSourceId::DataHub,
                category: LogCategoryId::Fault,
                event_code: LogEventCode::QueueingCommandFailedInternal,
                id: motor.get(),
            },
        };
        spawn_log(self.log.clone(), record);
    }
}

/// Forwards `FaultDispatcher`'s system-state side effects to the
/// lifecycle orchestrator (C9) — the two crates are siblings, so this
/// seam exists to avoid a direct `qmc-fault` -> `qmc-lifecycle`
/// dependency. `LifecycleOrchestrator` already implements the trait
/// directly; this wrapper exists only to make that explicit at the
/// wiring site.
pub struct LifecycleSystemEventSink {
    lifecycle: Arc<LifecycleOrchestrator>,
}

impl LifecycleSystemEventSink {
    pub fn new(lifecycle: Arc<LifecycleOrchestrator>) -> Arc<Self> {
        Arc::new(Self { lifecycle })
    }
}

impl SystemEventSink for LifecycleSystemEventSink {
    fn set_motor_fault_bit(&self, motor_id: MotorId) {
        self.lifecycle.set_motor_fault_bit(motor_id);
    }

    fn clear_motor_fault_bit(&self, motor_id: MotorId) {
        self.lifecycle.clear_motor_fault_bit(motor_id);
    }

    fn set_system_fault_bit(&self) {
        self.lifecycle.set_system_fault_bit();
    }

    fn clear_system_fault_bit(&self) {
        self.lifecycle.clear_system_fault_bit();
    }

    fn force_error_lifecycle(&self) {
        self.lifecycle.force_error_lifecycle();
    }
}

/// Simulated board transport (spec §4.4): the physical SPI/AFE/GD3000
/// wiring is out of scope hardware per spec.md §1, so this plays the
/// same role `SimulatedMotorControl` plays for the fast control loop —
/// steady-state "everything nominal" readings with no fault injection,
/// promoted out of `qmc-board`'s test module since it is this binary's
/// default transport rather than a test-only double.
pub struct SimulatedBoardTransport {
    switch_fails: AtomicBool,
    gd3000: StdMutex<[Gd3000Status; qmc_datahub::MAX_MOTORS]>,
}

impl SimulatedBoardTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            switch_fails: AtomicBool::new(false),
            gd3000: StdMutex::new([Gd3000Status::default(); qmc_datahub::MAX_MOTORS]),
        })
    }
}

#[async_trait::async_trait]
impl BoardTransport for SimulatedBoardTransport {
    async fn select_spi_device(&self, _device: SpiDevice) -> QmcResult<()> {
        if self.switch_fails.load(Ordering::SeqCst) {
            return Err(QmcError::Internal);
        }
        Ok(())
    }

    fn has_afe(&self, _motor_id: MotorId) -> bool {
        true
    }

    async fn init_afe(&self, _motor_id: MotorId) -> QmcResult<()> {
        Ok(())
    }

    async fn read_afe_channel(&self, _motor_id: MotorId, _channel: u8) -> QmcResult<f64> {
        Ok(0.5)
    }

    async fn read_gd3000_status(&self, motor_id: MotorId) -> QmcResult<Gd3000Status> {
        Ok(self.gd3000.lock().unwrap()[motor_id.get() as usize])
    }

    async fn reset_gd3000(&self, _motor_id: MotorId) -> QmcResult<()> {
        Ok(())
    }

    async fn clear_gd3000_flags(&self, motor_id: MotorId) -> QmcResult<()> {
        self.gd3000.lock().unwrap()[motor_id.get() as usize] = Gd3000Status::default();
        Ok(())
    }

    async fn read_db_temperature(&self) -> QmcResult<f32> {
        Ok(40.0)
    }

    async fn read_mcu_temperature(&self) -> QmcResult<f32> {
        Ok(45.0)
    }

    fn is_se_initialized(&self) -> bool {
        true
    }

    fn se_uid(&self) -> String {
        "simulated".into()
    }
}
