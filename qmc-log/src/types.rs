/// Every component that can author a log record (spec §3 `LogRecord`,
/// grounded on `api_logging.h`'s `log_source_id_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogSourceId {
    Unspecified = 0x00,
    Webservice = 0x01,
    FaultHandling = 0x02,
    CloudService = 0x03,
    LocalService = 0x04,
    BoardService = 0x05,
    AnomalyDetection = 0x06,
    MotorControl = 0x07,
    SecureWatchdog = 0x08,
    TaskStartup = 0x09,
    RpcModule = 0x0A,
    SecureWatchdogServiceRequestNonce = 0x0B,
    SecureWatchdogServiceRequestTicket = 0x0C,
    SecureWatchdogServiceKick = 0x0D,
    FunctionalWatchdog = 0x0E,
    PowerLossInterrupt = 0x0F,
    LoggingService = 0x10,
    Tsn = 0x11,
    DataHub = 0x12,
    SecureBootloader = 0x13,
}

impl LogSourceId {
    pub fn from_u8(v: u8) -> Option<Self> {
        use LogSourceId::*;
        const ALL: &[LogSourceId] = &[
            Unspecified, Webservice, FaultHandling, CloudService, LocalService, BoardService,
            AnomalyDetection, MotorControl, SecureWatchdog, TaskStartup, RpcModule,
            SecureWatchdogServiceRequestNonce, SecureWatchdogServiceRequestTicket,
            SecureWatchdogServiceKick, FunctionalWatchdog, PowerLossInterrupt, LoggingService,
            Tsn, DataHub, SecureBootloader,
        ];
        ALL.iter().find(|s| **s as u8 == v).copied()
    }
}

/// Spec §3 `LogRecord`'s category axis (`api_logging.h`'s `log_category_id_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogCategoryId {
    General = 0x00,
    Fault = 0x01,
    Authentication = 0x02,
    Connectivity = 0x03,
}

impl LogCategoryId {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::General),
            0x01 => Some(Self::Fault),
            0x02 => Some(Self::Authentication),
            0x03 => Some(Self::Connectivity),
            _ => None,
        }
    }
}

/// The full event-code space a `LogRecord` can carry, grounded
/// bit-for-bit on `api_logging.h`'s `log_event_code_t` (fault handling,
/// local service, secure watchdog, webservice/authentication, motor
/// control/DataHub, RPC, general, functional watchdog, and secure
/// bootloader event groups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogEventCode {
    AfeDbCommunicationError = 0x00,
    AfePsbCommunicationError = 0x01,
    DbTempSensCommunicationError = 0x02,
    DbOverTemperature = 0x03,
    EmergencyStop = 0x04,
    FaultBufferOverflow = 0x05,
    FaultQueueOverflow = 0x06,
    Gd3000Desaturation = 0x07,
    Gd3000LowVls = 0x08,
    Gd3000OverCurrent = 0x09,
    Gd3000OverTemperature = 0x0A,
    Gd3000PhaseError = 0x0B,
    Gd3000Reset = 0x0C,
    InvalidFaultSource = 0x0D,
    McuOverTemperature = 0x0E,
    NoFault = 0x0F,
    NoFaultBs = 0x10,
    NoFaultMc = 0x11,
    OverCurrent = 0x12,
    OverDcBusVoltage = 0x13,
    OverLoad = 0x14,
    OverSpeed = 0x15,
    PmicOverTemperature = 0x16,
    PmicUnderVoltage = 0x17,
    SpiSwitchFailed = 0x18,
    PsbOverTemperature1 = 0x19,
    PsbOverTemperature2 = 0x1A,
    RotorBlocked = 0x1B,
    UnderDcBusVoltage = 0x1C,

    Button1Pressed = 0x1D,
    Button2Pressed = 0x1E,
    Button3Pressed = 0x1F,
    Button4Pressed = 0x20,
    EmergencyButtonPressed = 0x21,
    LidOpenButton = 0x22,
    LidOpenSd = 0x23,
    TamperingButton = 0x24,
    TamperingSd = 0x25,

    ResetSecureWatchdog = 0x26,

    AccountResumed = 0x27,
    AccountSuspended = 0x28,
    LoginFailure = 0x29,
    SessionTimeout = 0x2A,
    TerminateSession = 0x2B,
    UserLogin = 0x2C,
    UserLogout = 0x2D,

    QueueingCommandFailedInternal = 0x2E,
    QueueingCommandFailedTsn = 0x2F,
    QueueingCommandFailedQueue = 0x30,

    ResetRequest = 0x31,
    InvalidResetCause = 0x32,

    InvalidArgument = 0x33,
    RpcCallFailed = 0x34,
    AwdtExpired = 0x35,
    SignatureInvalid = 0x36,
    Timeout = 0x37,
    SyncError = 0x38,
    InternalError = 0x39,
    NoBufsError = 0x3A,
    ConnectionError = 0x3B,
    RequestError = 0x3C,
    JsonParsingError = 0x3D,
    RangeError = 0x3E,
    PowerLoss = 0x3F,

    ResetFunctionalWatchdog = 0x40,
    FunctionalWatchdogKickFailed = 0x41,
    FunctionalWatchdogInitFailed = 0x42,

    Scp03ConnFailed = 0x43,
    Scp03KeyReconFailed = 0x44,
    NewFwReverted = 0x45,
    NewFwRevertFailed = 0x46,
    NewFwCommitted = 0x47,
    NewFwCommitFailed = 0x48,
    AwdtExpiredBootloader = 0x49,
    CfgDataBackedUp = 0x4A,
    CfgDataBackUpFailed = 0x4B,
    MainFwAuthFailed = 0x4C,
    FwuAuthFailed = 0x4D,
    StackError = 0x4E,
    KeyRevocation = 0x4F,
    InvalidFwuVersion = 0x50,
    ExtMemOprFailed = 0x51,
    BackUpImgAuthFailed = 0x52,
    SdCardFailed = 0x53,
    HwInitDeinitFailed = 0x54,
    SvnsLpGprOpFailed = 0x55,
    Scp03KeyRotationFailed = 0x56,
    DecommissioningFailed = 0x57,
    VerReadFromSeFailed = 0x58,
    FwExecutionFailed = 0x59,
    FwuCommitFailed = 0x5A,
    DeviceDecommissioned = 0x5B,
    RpcInitFailed = 0x5C,
    UnknownFwReturnStatus = 0x5D,
    NoLogEntry = 0x5E,
}

/// Discriminates which `LogRecordData` variant a record carries (spec §3,
/// `api_logging.h`'s `log_record_type_id_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordTypeId {
    DefaultData = 0x01,
    FaultDataWithId = 0x02,
    FaultDataWithoutId = 0x03,
    SystemData = 0x04,
    ErrorCount = 0x05,
}

/// The five record-body shapes spec §3 `LogRecord` can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordData {
    Default { source: LogSourceId, category: LogCategoryId, event_code: LogEventCode, user: u16 },
    FaultWithId { source: LogSourceId, category: LogCategoryId, event_code: LogEventCode, id: u8 },
    FaultWithoutId { source: LogSourceId, category: LogCategoryId, event_code: LogEventCode },
    SystemData { source: LogSourceId, category: LogCategoryId, event_code: LogEventCode },
    ErrorCount { source: LogSourceId, category: LogCategoryId, error_code: u16, user: u16, count: u16 },
}

impl LogRecordData {
    pub fn type_id(&self) -> LogRecordTypeId {
        match self {
            LogRecordData::Default { .. } => LogRecordTypeId::DefaultData,
            LogRecordData::FaultWithId { .. } => LogRecordTypeId::FaultDataWithId,
            LogRecordData::FaultWithoutId { .. } => LogRecordTypeId::FaultDataWithoutId,
            LogRecordData::SystemData { .. } => LogRecordTypeId::SystemData,
            LogRecordData::ErrorCount { .. } => LogRecordTypeId::ErrorCount,
        }
    }
}

/// 64-bit UNIX seconds plus a 16-bit sub-second millisecond component
/// quantized to 10 ms steps (spec §3 `LogRecord` invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogTimestamp {
    pub unix_seconds: u64,
    pub millis: u16,
}

impl LogTimestamp {
    pub fn new(unix_seconds: u64, millis: u16) -> Self {
        Self { unix_seconds, millis: (millis / 10) * 10 }
    }
}

/// Spec §3 `LogRecord.head`: `uuid` is strictly monotonic in the ring;
/// `checksum` guards against torn flash writes (not against tampering —
/// that's `EncryptedLogRecord.signature`'s job).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHead {
    pub checksum: u32,
    pub uuid: u64,
    pub timestamp: LogTimestamp,
}

/// Spec §3 `LogRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub head: RecordHead,
    pub data: LogRecordData,
}

/// Every variant's wire encoding is padded to this width so the ring's
/// payload records are evenly sized to the largest variant
/// (`log_recorddata_error_count_t`, spec §3 `FlashRecorder` invariant).
pub const LOG_RECORD_DATA_SIZE: usize = 8;

/// `head` (22 bytes) + type tag (1 byte) + data (8 bytes), rounded up to
/// an even byte count (`MAKE_EVEN` in `api_logging.h`'s `log_enc_data`).
pub const LOG_RECORD_WIRE_SIZE: usize = 32;

/// A cheap, non-cryptographic ring-corruption detector — tamper
/// evidence is `EncryptedLogRecord.signature`'s job, not this one's.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut acc: u32 = 0x811C_9DC5;
    for &b in bytes {
        acc ^= b as u32;
        acc = acc.wrapping_mul(0x0100_0193);
    }
    acc
}

impl LogRecord {
    /// Serializes head + type + data into the ring's fixed record width,
    /// recomputing `head.checksum` over everything but the checksum
    /// field itself.
    pub fn to_bytes(&self) -> [u8; LOG_RECORD_WIRE_SIZE] {
        let mut out = [0u8; LOG_RECORD_WIRE_SIZE];
        out[4..12].copy_from_slice(&self.head.uuid.to_be_bytes());
        out[12..20].copy_from_slice(&self.head.timestamp.unix_seconds.to_be_bytes());
        out[20..22].copy_from_slice(&self.head.timestamp.millis.to_be_bytes());
        out[22] = self.data.type_id() as u8;
        encode_data(&self.data, &mut out[23..23 + LOG_RECORD_DATA_SIZE]);
        let sum = checksum(&out[4..]);
        out[0..4].copy_from_slice(&sum.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; LOG_RECORD_WIRE_SIZE]) -> Option<Self> {
        let stored_checksum = u32::from_be_bytes(bytes[0..4].try_into().ok()?);
        if checksum(&bytes[4..]) != stored_checksum {
            return None;
        }
        let uuid = u64::from_be_bytes(bytes[4..12].try_into().ok()?);
        let unix_seconds = u64::from_be_bytes(bytes[12..20].try_into().ok()?);
        let millis = u16::from_be_bytes(bytes[20..22].try_into().ok()?);
        let type_id = bytes[22];
        let data = decode_data(type_id, &bytes[23..23 + LOG_RECORD_DATA_SIZE])?;
        Some(LogRecord {
            head: RecordHead { checksum: stored_checksum, uuid, timestamp: LogTimestamp { unix_seconds, millis } },
            data,
        })
    }
}

fn encode_data(data: &LogRecordData, out: &mut [u8]) {
    match *data {
        LogRecordData::Default { source, category, event_code, user } => {
            out[0] = source as u8;
            out[1] = category as u8;
            out[2] = event_code as u8;
            out[3..5].copy_from_slice(&user.to_be_bytes());
        }
        LogRecordData::FaultWithId { source, category, event_code, id } => {
            out[0] = source as u8;
            out[1] = category as u8;
            out[2] = event_code as u8;
            out[3] = id;
        }
        LogRecordData::FaultWithoutId { source, category, event_code } => {
            out[0] = source as u8;
            out[1] = category as u8;
            out[2] = event_code as u8;
        }
        LogRecordData::SystemData { source, category, event_code } => {
            out[0] = source as u8;
            out[1] = category as u8;
            out[2] = event_code as u8;
        }
        LogRecordData::ErrorCount { source, category, error_code, user, count } => {
            out[0] = source as u8;
            out[1] = category as u8;
            out[2..4].copy_from_slice(&error_code.to_be_bytes());
            out[4..6].copy_from_slice(&user.to_be_bytes());
            out[6..8].copy_from_slice(&count.to_be_bytes());
        }
    }
}

fn decode_data(type_id: u8, bytes: &[u8]) -> Option<LogRecordData> {
    let source = LogSourceId::from_u8(bytes[0])?;
    let category = LogCategoryId::from_u8(bytes[1])?;
    match type_id {
        0x01 => Some(LogRecordData::Default {
            source,
            category,
            event_code: event_code_from_u8(bytes[2])?,
            user: u16::from_be_bytes(bytes[3..5].try_into().ok()?),
        }),
        0x02 => Some(LogRecordData::FaultWithId {
            source,
            category,
            event_code: event_code_from_u8(bytes[2])?,
            id: bytes[3],
        }),
        0x03 => Some(LogRecordData::FaultWithoutId { source, category, event_code: event_code_from_u8(bytes[2])? }),
        0x04 => Some(LogRecordData::SystemData { source, category, event_code: event_code_from_u8(bytes[2])? }),
        0x05 => Some(LogRecordData::ErrorCount {
            source,
            category,
            error_code: u16::from_be_bytes(bytes[2..4].try_into().ok()?),
            user: u16::from_be_bytes(bytes[4..6].try_into().ok()?),
            count: u16::from_be_bytes(bytes[6..8].try_into().ok()?),
        }),
        _ => None,
    }
}

fn event_code_from_u8(v: u8) -> Option<LogEventCode> {
    // SAFETY-free manual table avoids depending on a crate for
    // enum-from-discriminant; the event-code space is dense 0x00..=0x5E
    // except for one duplicate value shared by bootloader/app AWDT
    // events, so a direct transmute would be unsound.
    use LogEventCode::*;
    const ALL: &[LogEventCode] = &[
        AfeDbCommunicationError, AfePsbCommunicationError, DbTempSensCommunicationError, DbOverTemperature,
        EmergencyStop, FaultBufferOverflow, FaultQueueOverflow, Gd3000Desaturation, Gd3000LowVls,
        Gd3000OverCurrent, Gd3000OverTemperature, Gd3000PhaseError, Gd3000Reset, InvalidFaultSource,
        McuOverTemperature, NoFault, NoFaultBs, NoFaultMc, OverCurrent, OverDcBusVoltage, OverLoad,
        OverSpeed, PmicOverTemperature, PmicUnderVoltage, SpiSwitchFailed, PsbOverTemperature1,
        PsbOverTemperature2, RotorBlocked, UnderDcBusVoltage, Button1Pressed, Button2Pressed,
        Button3Pressed, Button4Pressed, EmergencyButtonPressed, LidOpenButton, LidOpenSd, TamperingButton,
        TamperingSd, ResetSecureWatchdog, AccountResumed, AccountSuspended, LoginFailure, SessionTimeout,
        TerminateSession, UserLogin, UserLogout, QueueingCommandFailedInternal, QueueingCommandFailedTsn,
        QueueingCommandFailedQueue, ResetRequest, InvalidResetCause, InvalidArgument, RpcCallFailed,
        AwdtExpired, SignatureInvalid, Timeout, SyncError, InternalError, NoBufsError, ConnectionError,
        RequestError, JsonParsingError, RangeError, PowerLoss, ResetFunctionalWatchdog,
        FunctionalWatchdogKickFailed, FunctionalWatchdogInitFailed, Scp03ConnFailed, Scp03KeyReconFailed,
        NewFwReverted, NewFwRevertFailed, NewFwCommitted, NewFwCommitFailed, AwdtExpiredBootloader,
        CfgDataBackedUp, CfgDataBackUpFailed, MainFwAuthFailed, FwuAuthFailed, StackError, KeyRevocation,
        InvalidFwuVersion, ExtMemOprFailed, BackUpImgAuthFailed, SdCardFailed, HwInitDeinitFailed,
        SvnsLpGprOpFailed, Scp03KeyRotationFailed, DecommissioningFailed, VerReadFromSeFailed,
        FwExecutionFailed, FwuCommitFailed, DeviceDecommissioned, RpcInitFailed, UnknownFwReturnStatus,
        NoLogEntry,
    ];
    ALL.iter().find(|e| **e as u8 == v).copied()
}

/// Spec §3 `EncryptedLogRecord`: per-record AES-256-CBC with an
/// RSA-OAEP-wrapped key+IV, signed over SHA2-384(`keyIvEnc || recordEnc`)
/// with ECDSA-P384.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedLogRecord {
    pub length: u32,
    pub keyiv_enc: Vec<u8>,
    pub record_enc: Vec<u8>,
    pub signature: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogRecord {
        LogRecord {
            head: RecordHead { checksum: 0, uuid: 42, timestamp: LogTimestamp::new(1_700_000_000, 125) },
            data: LogRecordData::FaultWithId {
                source: LogSourceId::FaultHandling,
                category: LogCategoryId::Fault,
                event_code: LogEventCode::OverCurrent,
                id: 2,
            },
        }
    }

    #[test]
    fn round_trips_through_wire_bytes() {
        let record = sample();
        let bytes = record.to_bytes();
        let restored = LogRecord::from_bytes(&bytes).unwrap();
        assert_eq!(restored.data, record.data);
        assert_eq!(restored.head.uuid, record.head.uuid);
        assert_eq!(restored.head.timestamp, record.head.timestamp);
    }

    #[test]
    fn timestamp_millis_quantized_to_10ms() {
        let ts = LogTimestamp::new(0, 127);
        assert_eq!(ts.millis, 120);
    }

    #[test]
    fn corrupted_bytes_fail_checksum() {
        let mut bytes = sample().to_bytes();
        bytes[25] ^= 0xFF;
        assert!(LogRecord::from_bytes(&bytes).is_none());
    }
}
