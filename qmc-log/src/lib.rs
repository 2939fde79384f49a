//! Tamper-evident log pipeline: flash ring storage, per-record hybrid
//! encryption, SD-card rotation, and dynamic consumer fan-out (spec
//! §4.5, C5).

pub mod fanout;
pub mod pipeline;
pub mod recorder;
pub mod sd;
pub mod service;
pub mod types;

pub use fanout::{LogFanout, LogQueueHandle, MAX_LOG_QUEUES};
pub use pipeline::{decrypt_record, encrypt_record};
pub use recorder::{FileSectorDevice, FlashRecorder, MemSectorDevice, RingStore, SectorDevice};
pub use sd::{MemSdCard, SdCardSink};
pub use service::{
    LogService, NoopShutdownSink, ShutdownMotorSink, ShutdownReason, SYSEVENT_LOG_FLASH_ERROR,
    SYSEVENT_LOG_MESSAGE_LOST, SYSEVENT_MEMORY_SD_CARD_AVAILABLE,
};
pub use types::{
    checksum, EncryptedLogRecord, LogCategoryId, LogEventCode, LogRecord, LogRecordData, LogRecordTypeId,
    LogSourceId, LogTimestamp, RecordHead, LOG_RECORD_DATA_SIZE, LOG_RECORD_WIRE_SIZE,
};
