use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

/// `svns_lpgpr_t.fwState` (spec §6 "SNVS-LP-GPR", grounded on
/// `qmc2_lpgpr.c`'s `SNVS_LPGPR_FWUSTATUS_SNVS_MASK` field): the
/// firmware-update handoff flag the secondary bootloader reads once at
/// boot and the application writes on the lifecycle transitions that
/// affect it. The application never sets `Commit` itself — only the SBL
/// does, after it has verified the image on its own next boot (spec §9
/// design note: "it must never self-declare committed").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FwState {
    None = 0,
    Revert = 1,
    Commit = 2,
    BackupCfg = 3,
    AwdtExpired = 4,
    VerifyFw = 5,
    TimestampIssue = 6,
}

impl FwState {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(FwState::None),
            1 => Some(FwState::Revert),
            2 => Some(FwState::Commit),
            3 => Some(FwState::BackupCfg),
            4 => Some(FwState::AwdtExpired),
            5 => Some(FwState::VerifyFw),
            6 => Some(FwState::TimestampIssue),
            _ => None,
        }
    }
}

/// The SNVS low-power general-purpose register (spec §6): a
/// battery-backed word surviving a reset, holding `fwState` in its low
/// 8 bits with the rest reserved (`SNVS_LPGPR_FWUSTATUS_SNVS_MASK`/
/// `_POS` in the original). The physical register is out of scope
/// hardware per spec.md §1; this trait is the seam `qmc-app` wires a
/// real MMIO accessor or (as here) a file-backed stand-in into.
pub trait SnvsLpGpr: Send + Sync {
    fn read(&self) -> FwState;
    fn write(&self, state: FwState);
}

/// A plain in-memory stand-in, for tests and anywhere persistence across
/// a process restart isn't being exercised.
pub struct MemSnvs {
    word: Mutex<u8>,
}

impl MemSnvs {
    pub fn new(initial: FwState) -> Self {
        Self { word: Mutex::new(initial as u8) }
    }
}

impl SnvsLpGpr for MemSnvs {
    fn read(&self) -> FwState {
        FwState::from_u8(*self.word.lock().unwrap()).unwrap_or(FwState::None)
    }

    fn write(&self, state: FwState) {
        *self.word.lock().unwrap() = state as u8;
    }
}

/// A file-backed stand-in for the battery-backed register, so a
/// developer rig can exercise the "SBL handed off `AwdtExpired`" boot
/// path across process restarts without real SNVS hardware.
pub struct FileSnvs {
    file: Mutex<std::fs::File>,
}

impl FileSnvs {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let mut file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(path)?;
        if file.metadata()?.len() == 0 {
            file.write_all(&[FwState::None as u8])?;
        }
        Ok(Self { file: Mutex::new(file) })
    }
}

impl SnvsLpGpr for FileSnvs {
    fn read(&self) -> FwState {
        let mut file = self.file.lock().unwrap();
        let mut byte = [0u8; 1];
        if file.seek(SeekFrom::Start(0)).is_err() || file.read_exact(&mut byte).is_err() {
            return FwState::None;
        }
        FwState::from_u8(byte[0]).unwrap_or(FwState::None)
    }

    fn write(&self, state: FwState) {
        let mut file = self.file.lock().unwrap();
        if file.seek(SeekFrom::Start(0)).is_ok() {
            let _ = file.write_all(&[state as u8]);
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_snvs_round_trips() {
        let snvs = MemSnvs::new(FwState::None);
        assert_eq!(snvs.read(), FwState::None);
        snvs.write(FwState::AwdtExpired);
        assert_eq!(snvs.read(), FwState::AwdtExpired);
    }

    #[test]
    fn file_snvs_persists_across_reattach() {
        let dir = std::env::temp_dir().join(format!("qmc-lifecycle-snvs-test-{}", std::process::id()));
        let snvs = FileSnvs::open(&dir).unwrap();
        snvs.write(FwState::VerifyFw);
        drop(snvs);
        let reattached = FileSnvs::open(&dir).unwrap();
        assert_eq!(reattached.read(), FwState::VerifyFw);
        let _ = std::fs::remove_file(&dir);
    }
}
