use std::io::{Read, Seek, SeekFrom, Write};

use qmc_kernel::error::{QmcError, QmcResult};

use crate::types::{LogRecord, LOG_RECORD_WIRE_SIZE};

/// The flash-sector abstraction behind `FlashRecorder` (spec §3
/// `FlashRecorder`, grounded on `flash_recorder.h`'s `recorder_t` sector
/// access). Mirrors `qmc-config`'s `ConfigFlash` seam: writes always
/// happen in whole sectors, and the real target drives this through the
/// same FlexSPI NOR polling transfer, out of scope per spec §1.
pub trait SectorDevice: Send + Sync {
    fn sector_size(&self) -> usize;
    fn sector_count(&self) -> usize;
    fn read_sector(&mut self, index: usize) -> Vec<u8>;
    fn write_sector(&mut self, index: usize, data: &[u8]) -> bool;
}

/// A flat, in-memory sector device — used by every test in this crate.
pub struct MemSectorDevice {
    sector_size: usize,
    sectors: Vec<Vec<u8>>,
}

impl MemSectorDevice {
    pub fn new(sector_size: usize, sector_count: usize) -> Self {
        Self { sector_size, sectors: vec![vec![0u8; sector_size]; sector_count] }
    }
}

impl SectorDevice for MemSectorDevice {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    fn read_sector(&mut self, index: usize) -> Vec<u8> {
        self.sectors[index].clone()
    }

    fn write_sector(&mut self, index: usize, data: &[u8]) -> bool {
        let mut sector = vec![0u8; self.sector_size];
        sector[..data.len()].copy_from_slice(data);
        self.sectors[index] = sector;
        true
    }
}

/// A real-target stand-in: a flat file sliced into fixed-size sectors,
/// for exercising the recorder against something with actual I/O
/// latency and persistence across process restarts.
pub struct FileSectorDevice {
    file: std::fs::File,
    sector_size: usize,
    sector_count: usize,
}

impl FileSectorDevice {
    pub fn open(path: &std::path::Path, sector_size: usize, sector_count: usize) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(path)?;
        file.set_len((sector_size * sector_count) as u64)?;
        Ok(Self { file, sector_size, sector_count })
    }
}

impl SectorDevice for FileSectorDevice {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> usize {
        self.sector_count
    }

    fn read_sector(&mut self, index: usize) -> Vec<u8> {
        let mut buf = vec![0u8; self.sector_size];
        if self.file.seek(SeekFrom::Start((index * self.sector_size) as u64)).is_ok() {
            let _ = self.file.read_exact(&mut buf);
        }
        buf
    }

    fn write_sector(&mut self, index: usize, data: &[u8]) -> bool {
        let mut sector = vec![0u8; self.sector_size];
        sector[..data.len()].copy_from_slice(data);
        self.file.seek(SeekFrom::Start((index * self.sector_size) as u64)).is_ok()
            && self.file.write_all(&sector).is_ok()
    }
}

/// One `recorder_t` ring: a fixed-size circular log of
/// `LOG_RECORD_WIRE_SIZE` records over a sector-backed region, tracking
/// the next write position and the UUID of the next record to assign
/// (`g_InfRecorder`/`g_LogRecorder` in the original `datalogger.c`).
pub struct RingStore {
    device: Box<dyn SectorDevice>,
    area_begin: usize,
    area_length_sectors: usize,
    records_per_sector: usize,
    next_index: usize,
    next_uuid: u64,
}

impl RingStore {
    /// `FlashRecorderInit`: attaches to an already-formatted ring.
    /// Callers that don't know whether the region holds a valid ring yet
    /// should call `format` first (mirrors `FlashRecorderFormat`'s
    /// fallback path in `DataloggerInit`).
    pub fn new(device: Box<dyn SectorDevice>, area_begin: usize, area_length_sectors: usize) -> QmcResult<Self> {
        let records_per_sector = device.sector_size() / LOG_RECORD_WIRE_SIZE;
        if records_per_sector == 0 {
            return Err(QmcError::ArgInvalid);
        }
        let mut ring = Self {
            device,
            area_begin,
            area_length_sectors,
            records_per_sector,
            next_index: 0,
            next_uuid: 0,
        };
        ring.recover();
        Ok(ring)
    }

    fn total_slots(&self) -> usize {
        self.area_length_sectors * self.records_per_sector
    }

    fn slot_location(&self, slot: usize) -> (usize, usize) {
        let sector = self.area_begin + slot / self.records_per_sector;
        let offset = (slot % self.records_per_sector) * LOG_RECORD_WIRE_SIZE;
        (sector, offset)
    }

    fn read_slot(&mut self, slot: usize) -> Option<LogRecord> {
        let (sector, offset) = self.slot_location(slot);
        let sector_bytes = self.device.read_sector(sector);
        let bytes: [u8; LOG_RECORD_WIRE_SIZE] =
            sector_bytes.get(offset..offset + LOG_RECORD_WIRE_SIZE)?.try_into().ok()?;
        LogRecord::from_bytes(&bytes)
    }

    /// Scans the ring for the highest UUID written, so a restart resumes
    /// appending after the last valid record rather than overwriting it.
    fn recover(&mut self) {
        let total = self.total_slots();
        let mut best_uuid = None;
        let mut best_slot = 0;
        for slot in 0..total {
            if let Some(record) = self.read_slot(slot) {
                if best_uuid.map(|u| record.head.uuid > u).unwrap_or(true) {
                    best_uuid = Some(record.head.uuid);
                    best_slot = slot;
                }
            }
        }
        match best_uuid {
            Some(uuid) => {
                self.next_index = (best_slot + 1) % total;
                self.next_uuid = uuid + 1;
            }
            None => {
                self.next_index = 0;
                self.next_uuid = 0;
            }
        }
    }

    /// Zeroes every sector in the ring's region and resets write state —
    /// `FlashRecorderFormat`'s fallback path when `FlashRecorderInit`
    /// finds no valid ring.
    pub fn format(&mut self) -> QmcResult<()> {
        let blank = vec![0u8; self.device.sector_size()];
        for i in 0..self.area_length_sectors {
            if !self.device.write_sector(self.area_begin + i, &blank) {
                return Err(QmcError::Err);
            }
        }
        self.next_index = 0;
        self.next_uuid = 0;
        Ok(())
    }

    /// Appends one record, stamping it with the ring's next UUID and
    /// wrapping over the oldest slot once the ring is full (spec §3
    /// `FlashRecorder` invariant: "a full ring overwrites its oldest
    /// record rather than rejecting new writes").
    pub fn append(&mut self, mut record: LogRecord) -> QmcResult<u64> {
        record.head.uuid = self.next_uuid;
        let bytes = record.to_bytes();
        let (sector, offset) = self.slot_location(self.next_index);
        let mut sector_bytes = self.device.read_sector(sector);
        if sector_bytes.len() < offset + LOG_RECORD_WIRE_SIZE {
            sector_bytes.resize(self.device.sector_size(), 0);
        }
        sector_bytes[offset..offset + LOG_RECORD_WIRE_SIZE].copy_from_slice(&bytes);
        if !self.device.write_sector(sector, &sector_bytes) {
            return Err(QmcError::Err);
        }
        let uuid = self.next_uuid;
        self.next_uuid += 1;
        self.next_index = (self.next_index + 1) % self.total_slots();
        Ok(uuid)
    }

    /// Reads back the most recently appended record, if any.
    pub fn last_record(&mut self) -> Option<LogRecord> {
        if self.next_uuid == 0 {
            return None;
        }
        let total = self.total_slots();
        let last_slot = (self.next_index + total - 1) % total;
        self.read_slot(last_slot)
    }

    pub fn last_uuid(&self) -> Option<u64> {
        if self.next_uuid == 0 {
            None
        } else {
            Some(self.next_uuid - 1)
        }
    }

    /// Looks up a record by UUID (spec §4.5 `log_get_record`). Appends
    /// advance `next_index` in lockstep with `next_uuid` modulo the ring
    /// size, so a UUID's slot is always `uuid % total_slots` — no scan
    /// needed. Returns `None` for a UUID never assigned or since
    /// overwritten by ring wraparound.
    pub fn get(&mut self, uuid: u64) -> Option<LogRecord> {
        if self.next_uuid == 0 || uuid >= self.next_uuid {
            return None;
        }
        let total = self.total_slots() as u64;
        if self.next_uuid - uuid > total {
            return None; // overwritten
        }
        let slot = (uuid % total) as usize;
        let record = self.read_slot(slot)?;
        if record.head.uuid == uuid {
            Some(record)
        } else {
            None
        }
    }
}

/// The info/payload recorder pair (spec §3 `FlashRecorder`, grounded on
/// `datalogger.c`'s `g_InfRecorder`/`g_LogRecorder` split): the info
/// ring holds small system/bookkeeping records, the payload ring holds
/// everything else. Both share the same wire format and are addressed
/// independently so a full payload ring never evicts info records.
pub struct FlashRecorder {
    pub info: RingStore,
    pub payload: RingStore,
}

impl FlashRecorder {
    pub fn new(info: RingStore, payload: RingStore) -> Self {
        Self { info, payload }
    }

    pub fn append_payload(&mut self, record: LogRecord) -> QmcResult<u64> {
        self.payload.append(record)
    }

    pub fn append_info(&mut self, record: LogRecord) -> QmcResult<u64> {
        self.info.append(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogCategoryId, LogEventCode, LogRecordData, LogSourceId, LogTimestamp, RecordHead};

    fn sample(uuid: u64) -> LogRecord {
        LogRecord {
            head: RecordHead { checksum: 0, uuid, timestamp: LogTimestamp::new(1_700_000_000 + uuid, 0) },
            data: LogRecordData::SystemData {
                source: LogSourceId::LoggingService,
                category: LogCategoryId::General,
                event_code: LogEventCode::NoFault,
            },
        }
    }

    fn ring(sectors: usize) -> RingStore {
        let device = Box::new(MemSectorDevice::new(128, sectors));
        RingStore::new(device, 0, sectors).unwrap()
    }

    #[test]
    fn append_assigns_monotonic_uuids() {
        let mut ring = ring(2);
        let first = ring.append(sample(0)).unwrap();
        let second = ring.append(sample(0)).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 1);
    }

    #[test]
    fn full_ring_overwrites_oldest_slot() {
        let mut ring = ring(1); // 128 / 32 = 4 slots
        for _ in 0..5 {
            ring.append(sample(0)).unwrap();
        }
        let last = ring.last_record().unwrap();
        assert_eq!(last.head.uuid, 4);
    }

    #[test]
    fn recover_resumes_after_reattach() {
        let device: Box<dyn SectorDevice> = Box::new(MemSectorDevice::new(128, 1));
        let mut ring = RingStore::new(device, 0, 1).unwrap();
        ring.append(sample(0)).unwrap();
        ring.append(sample(0)).unwrap();
        let device_taken = std::mem::replace(&mut ring.device, Box::new(MemSectorDevice::new(1, 1)));
        let reattached = RingStore::new(device_taken, 0, 1).unwrap();
        assert_eq!(reattached.last_uuid(), Some(1));
    }

    #[test]
    fn get_finds_a_live_record_and_misses_an_overwritten_one() {
        let mut ring = ring(1); // 4 slots
        for _ in 0..6 {
            ring.append(sample(0)).unwrap();
        }
        assert!(ring.get(0).is_none()); // overwritten by the wrap
        assert_eq!(ring.get(5).unwrap().head.uuid, 5);
        assert!(ring.get(99).is_none()); // never assigned
    }

    #[test]
    fn format_clears_and_resets_uuid_counter() {
        let mut ring = ring(1);
        ring.append(sample(0)).unwrap();
        ring.format().unwrap();
        assert_eq!(ring.last_uuid(), None);
        let next = ring.append(sample(0)).unwrap();
        assert_eq!(next, 0);
    }
}
