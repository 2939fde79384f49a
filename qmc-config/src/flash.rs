/// The flash-sector abstraction behind `ConfigStore` and the
/// firmware-update chunk writer (spec §4.6). Writes always happen in
/// whole sectors, the invariant `FlashRecorder` also relies on (spec §3)
/// — crossing a sector boundary here means the caller already split the
/// write at a sector edge.
///
/// The real target drives this through
/// `dataflash_dispatcher/flexspi_nor_polling_transfer.c`'s FlexSPI NOR
/// polling transfer, out of scope per spec §1; `MemFlash` is the
/// in-process stand-in used by every test in this crate and by the
/// simulated boot path.
pub trait ConfigFlash: Send + Sync {
    fn sector_size(&self) -> usize;
    fn sector_count(&self) -> usize;
    fn read_sector(&self, index: usize) -> Vec<u8>;
    /// Erases then writes `data` (at most one sector's worth) at
    /// `index`. Returns `false` on simulated transient failure so
    /// callers can exercise their retry paths.
    fn write_sector(&mut self, index: usize, data: &[u8]) -> bool;
}

/// A flat, in-memory sector device.
pub struct MemFlash {
    sector_size: usize,
    sectors: Vec<Vec<u8>>,
}

impl MemFlash {
    pub fn new(sector_size: usize, sector_count: usize) -> Self {
        Self {
            sector_size,
            sectors: vec![vec![0u8; sector_size]; sector_count],
        }
    }
}

impl ConfigFlash for MemFlash {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    fn read_sector(&self, index: usize) -> Vec<u8> {
        self.sectors[index].clone()
    }

    fn write_sector(&mut self, index: usize, data: &[u8]) -> bool {
        let mut sector = vec![0u8; self.sector_size];
        sector[..data.len()].copy_from_slice(data);
        self.sectors[index] = sector;
        true
    }
}
