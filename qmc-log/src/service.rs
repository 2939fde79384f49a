use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use qmc_kernel::error::QmcResult;
use qmc_kernel::Queue;

use crate::fanout::LogFanout;
pub use crate::fanout::LogQueueHandle;
use crate::pipeline::encrypt_record;
use crate::recorder::FlashRecorder;
use crate::sd::SdCardSink;
use crate::types::{EncryptedLogRecord, LogRecord};
use qmc_se::SeSession;

/// System-event bits this crate raises on the shared `SystemStatus`
/// event group (spec §3 `SystemStatus`, grounded on
/// `api_qmc2go.h`'s `QMC_SYSEVENT_LOG_*` group).
pub const SYSEVENT_LOG_FLASH_ERROR: u32 = 1 << 0;
pub const SYSEVENT_LOG_MESSAGE_LOST: u32 = 1 << 1;
pub const SYSEVENT_MEMORY_SD_CARD_AVAILABLE: u32 = 1 << 2;

/// `DATALOGGER_RCV_QUEUE_DEPTH` (spec §4.5): the inbound queue every
/// `log_queue_entry` call feeds, drained one record at a time by
/// `LogService::run`.
const INBOUND_QUEUE_DEPTH: usize = 32;

/// The cross-cutting calls the shutdown-drain path makes into the rest
/// of the system (spec §4.5: "stop all motors, disable TSN command
/// injection, disable fast-loop interrupts") without this crate taking a
/// hard dependency on `qmc-datahub`/`qmc-fault`. `qmc-app` wires a
/// concrete sink at startup; tests use `NoopShutdownSink`.
pub trait ShutdownMotorSink: Send + Sync {
    fn stop_all_motors(&self);
    fn set_tsn_command_injection(&self, enabled: bool);
    fn disable_fast_loop_interrupts(&self);
}

pub struct NoopShutdownSink;

impl ShutdownMotorSink for NoopShutdownSink {
    fn stop_all_motors(&self) {}
    fn set_tsn_command_injection(&self, _enabled: bool) {}
    fn disable_fast_loop_interrupts(&self) {}
}

/// Why a shutdown drain was entered (spec §4.9 `SHUTDOWN_PowerLoss` /
/// `SHUTDOWN_WatchdogReset`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    PowerLoss,
    WatchdogReset,
}

struct Inbound {
    record: LogRecord,
    priority: bool,
}

/// The tamper-evident log pipeline (spec §4.5, C5): receives plain
/// records, appends them to the flash ring, optionally encrypts and
/// exports them to the SD card and any dynamic fan-out queues, and owns
/// the power-loss/watchdog-reset drain sequence.
pub struct LogService {
    recorder: Mutex<FlashRecorder>,
    se: Arc<SeSession>,
    fanout: Arc<LogFanout>,
    sd: Arc<dyn SdCardSink>,
    shutdown_sink: Arc<dyn ShutdownMotorSink>,
    inbound: Arc<Queue<Inbound>>,
    system_bits: AtomicU32,
}

impl LogService {
    pub fn new(
        recorder: FlashRecorder,
        se: Arc<SeSession>,
        sd: Arc<dyn SdCardSink>,
        shutdown_sink: Arc<dyn ShutdownMotorSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            recorder: Mutex::new(recorder),
            se,
            fanout: LogFanout::new(),
            sd,
            shutdown_sink,
            inbound: Queue::new(INBOUND_QUEUE_DEPTH),
            system_bits: AtomicU32::new(0),
        })
    }

    pub fn system_bits(&self) -> u32 {
        self.system_bits.load(Ordering::SeqCst)
    }

    fn raise_event(&self, bit: u32) {
        self.system_bits.fetch_or(bit, Ordering::SeqCst);
    }

    /// `LOG_QueueLogEntry` (spec §4.5): enqueues a record for the
    /// pipeline task to process. `priority` jumps the record to the
    /// front of the inbound queue (used by the shutdown drain path).
    pub async fn queue_entry(&self, record: LogRecord, priority: bool) -> QmcResult<()> {
        let item = Inbound { record, priority };
        if priority {
            self.inbound.send_front(item, Duration::ZERO).await
        } else {
            self.inbound.send(item, Duration::ZERO).await
        }
    }

    pub async fn get_new_queue(&self) -> QmcResult<LogQueueHandle> {
        self.fanout.get_new_queue().await
    }

    pub async fn return_queue(&self, handle: LogQueueHandle) -> QmcResult<()> {
        self.fanout.return_queue(handle).await
    }

    pub async fn dequeue_encrypted(&self, handle: LogQueueHandle, to: Duration) -> QmcResult<EncryptedLogRecord> {
        self.fanout.dequeue(handle, to).await
    }

    /// `log_last_id` (spec §4.5): the UUID of the most recently persisted
    /// payload record, used by the `/log` REST endpoint's ETag.
    pub async fn last_id(&self) -> Option<u64> {
        self.recorder.lock().await.payload.last_uuid()
    }

    /// `log_get_record` (spec §4.5): looks up one payload record by UUID
    /// in plaintext, for callers that are themselves the trust boundary
    /// (e.g. a local diagnostic path). Most consumers should prefer
    /// `get_record_encrypted`.
    pub async fn get_record(&self, uuid: u64) -> Option<LogRecord> {
        self.recorder.lock().await.payload.get(uuid)
    }

    /// `log_get_record_encrypted` (spec §4.5): looks up one payload
    /// record by UUID and runs it through the same hybrid-encryption
    /// envelope as the fan-out/SD export path, for the `/log` REST
    /// endpoint's paged retrieval.
    pub async fn get_record_encrypted(&self, uuid: u64) -> QmcResult<Option<EncryptedLogRecord>> {
        let record = self.recorder.lock().await.payload.get(uuid);
        match record {
            Some(record) => encrypt_record(&self.se, &record).await.map(Some),
            None => Ok(None),
        }
    }

    /// `log_format`: wipes both rings, for first-boot provisioning and
    /// the decommissioning flow (spec §4.5's "a decommissioned device's
    /// log history is unrecoverable").
    pub async fn format(&self) -> QmcResult<()> {
        let mut recorder = self.recorder.lock().await;
        recorder.info.format()?;
        recorder.payload.format()
    }

    /// The main drain loop: pulls one record at a time off the inbound
    /// queue and runs it through the five-step pipeline (spec §4.5).
    /// Runs until the queue's owning `Arc` is dropped and every sender
    /// has gone away, at which point `recv` degrades to timing out
    /// forever and the caller's `select!` (if any) takes over — in
    /// practice this is spawned once at startup and runs for the life
    /// of the process.
    pub async fn run(self: Arc<Self>) {
        loop {
            let Ok(item) = self.inbound.recv(Duration::from_secs(3600)).await else {
                continue;
            };
            self.process(item.record).await;
        }
    }

    async fn process(&self, record: LogRecord) {
        let append_result = {
            let mut recorder = self.recorder.lock().await;
            recorder.append_payload(record)
        };
        if append_result.is_err() {
            self.raise_event(SYSEVENT_LOG_FLASH_ERROR);
            return;
        }

        let has_consumers = self.sd.is_mounted() || self.fanout.has_subscribers().await;
        if !has_consumers {
            return;
        }

        let encrypted = match encrypt_record(&self.se, &record).await {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "log record encryption failed, skipping export");
                return;
            }
        };

        if self.sd.is_mounted() {
            let wire = encrypted_to_wire(&encrypted);
            if !self.sd.append(&wire) {
                self.raise_event(SYSEVENT_LOG_FLASH_ERROR);
            } else {
                self.raise_event(SYSEVENT_MEMORY_SD_CARD_AVAILABLE);
            }
        }

        let lost = self.fanout.publish(&encrypted).await;
        if lost > 0 {
            self.raise_event(SYSEVENT_LOG_MESSAGE_LOST);
        }
    }

    /// Spec §4.9's power-loss/watchdog-reset shutdown drain: bumps to
    /// top priority in spirit (the caller is expected to already be
    /// running at elevated priority by the time this is invoked), stops
    /// every motor and disables command injection and the fast control
    /// loop interrupts, then drains whatever is left in the inbound
    /// queue straight to flash — no encryption, no SD/fan-out export,
    /// since by definition no consumer will survive this reset.
    pub async fn shutdown_drain(&self, reason: ShutdownReason) {
        self.shutdown_sink.stop_all_motors();
        self.shutdown_sink.set_tsn_command_injection(false);
        self.shutdown_sink.disable_fast_loop_interrupts();

        let pending = self.inbound.drain().await;
        let mut recorder = self.recorder.lock().await;
        for item in pending {
            if recorder.append_payload(item.record).is_err() {
                self.raise_event(SYSEVENT_LOG_FLASH_ERROR);
            }
        }
        warn!(?reason, "log pipeline drained for shutdown");
    }
}

/// `EncryptedLogRecord`'s on-disk/on-wire framing: a big-endian length
/// prefix for each variable-length field, so a reader can slice the
/// stream back into records without a schema.
fn encrypted_to_wire(record: &EncryptedLogRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 4 + record.keyiv_enc.len() + 4 + record.record_enc.len() + 4 + record.signature.len());
    out.extend_from_slice(&record.length.to_be_bytes());
    out.extend_from_slice(&(record.keyiv_enc.len() as u32).to_be_bytes());
    out.extend_from_slice(&record.keyiv_enc);
    out.extend_from_slice(&(record.record_enc.len() as u32).to_be_bytes());
    out.extend_from_slice(&record.record_enc);
    out.extend_from_slice(&(record.signature.len() as u32).to_be_bytes());
    out.extend_from_slice(&record.signature);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{MemSectorDevice, RingStore};
    use crate::sd::MemSdCard;
    use crate::types::{LogCategoryId, LogEventCode, LogRecordData, LogSourceId, LogTimestamp, RecordHead};
    use qmc_se::EphemeralTransport;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn sample() -> LogRecord {
        LogRecord {
            head: RecordHead { checksum: 0, uuid: 0, timestamp: LogTimestamp::new(1_700_000_000, 0) },
            data: LogRecordData::SystemData {
                source: LogSourceId::LoggingService,
                category: LogCategoryId::General,
                event_code: LogEventCode::NoFault,
            },
        }
    }

    fn recorder() -> FlashRecorder {
        let info = RingStore::new(Box::new(MemSectorDevice::new(128, 2)), 0, 2).unwrap();
        let payload = RingStore::new(Box::new(MemSectorDevice::new(128, 2)), 0, 2).unwrap();
        FlashRecorder::new(info, payload)
    }

    fn se() -> Arc<SeSession> {
        Arc::new(SeSession::open(Box::new(EphemeralTransport::new([3u8; 32]))).unwrap())
    }

    struct CountingShutdownSink {
        stops: AtomicUsize,
    }

    impl ShutdownMotorSink for CountingShutdownSink {
        fn stop_all_motors(&self) {
            self.stops.fetch_add(1, AtomicOrdering::SeqCst);
        }
        fn set_tsn_command_injection(&self, _enabled: bool) {}
        fn disable_fast_loop_interrupts(&self) {}
    }

    #[tokio::test]
    async fn record_with_no_consumers_skips_encryption_but_still_persists() {
        let sd = Arc::new(MemSdCard::new(false, 4096, 4));
        let svc = LogService::new(recorder(), se(), sd, Arc::new(NoopShutdownSink));
        svc.queue_entry(sample(), false).await.unwrap();
        let item = svc.inbound.recv(Duration::ZERO).await.unwrap();
        svc.process(item.record).await;
        let mut recorder = svc.recorder.lock().await;
        assert_eq!(recorder.payload.last_uuid(), Some(0));
        assert_eq!(svc.system_bits(), 0);
    }

    #[tokio::test]
    async fn record_with_sd_mounted_exports_and_sets_card_available() {
        let sd = Arc::new(MemSdCard::new(true, 4096, 4));
        let svc = LogService::new(recorder(), se(), sd.clone(), Arc::new(NoopShutdownSink));
        svc.process(sample()).await;
        assert_eq!(svc.system_bits() & SYSEVENT_MEMORY_SD_CARD_AVAILABLE, SYSEVENT_MEMORY_SD_CARD_AVAILABLE);
        assert!(sd.total_bytes() > 0);
    }

    #[tokio::test]
    async fn fanout_overrun_sets_message_lost() {
        let sd = Arc::new(MemSdCard::new(false, 4096, 4));
        let svc = LogService::new(recorder(), se(), sd, Arc::new(NoopShutdownSink));
        let handle = svc.get_new_queue().await.unwrap();
        for _ in 0..32 {
            svc.process(sample()).await;
        }
        assert_eq!(svc.system_bits() & SYSEVENT_LOG_MESSAGE_LOST, SYSEVENT_LOG_MESSAGE_LOST);
        let _ = svc.return_queue(handle).await;
    }

    #[tokio::test]
    async fn get_record_round_trips_through_encryption() {
        let sd = Arc::new(MemSdCard::new(false, 4096, 4));
        let svc = LogService::new(recorder(), se(), sd, Arc::new(NoopShutdownSink));
        svc.process(sample()).await;
        assert_eq!(svc.last_id().await, Some(0));
        let plain = svc.get_record(0).await.unwrap();
        assert_eq!(plain.head.uuid, 0);
        let encrypted = svc.get_record_encrypted(0).await.unwrap().unwrap();
        assert_eq!(crate::pipeline::decrypt_record(&svc.se, &encrypted).await.unwrap().head.uuid, 0);
        assert!(svc.get_record(42).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_drain_stops_motors_and_flushes_pending_records() {
        let sd = Arc::new(MemSdCard::new(false, 4096, 4));
        let shutdown_sink = Arc::new(CountingShutdownSink { stops: AtomicUsize::new(0) });
        let svc = LogService::new(recorder(), se(), sd, shutdown_sink.clone());
        svc.queue_entry(sample(), true).await.unwrap();
        svc.shutdown_drain(ShutdownReason::PowerLoss).await;
        assert_eq!(shutdown_sink.stops.load(AtomicOrdering::SeqCst), 1);
        let mut recorder = svc.recorder.lock().await;
        assert_eq!(recorder.payload.last_uuid(), Some(0));
    }
}
