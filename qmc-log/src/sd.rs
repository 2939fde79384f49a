use std::sync::Mutex;

/// The SD-card export path's rotation contract (spec §4.5 step 4,
/// grounded on `datalogger.c`'s `SDCard_WriteRecord`/`Handle_file`):
/// encrypted records are appended to the current rotation file until it
/// crosses `max_file_size`, at which point a new file is opened and the
/// oldest file is unlinked if the rotation set is full. The physical SD
/// host controller and filesystem driver are out of scope per spec §1;
/// this crate only needs "is a card present" and "append bytes,
/// rotating as needed".
pub trait SdCardSink: Send + Sync {
    fn is_mounted(&self) -> bool;

    /// Appends one already-serialized `EncryptedLogRecord` to the active
    /// rotation file, rotating first if the append would cross
    /// `max_file_size`. Returns `false` on simulated write failure.
    fn append(&self, data: &[u8]) -> bool;
}

/// In-memory stand-in used by this crate's tests: a bounded ring of
/// fixed-capacity "files", each a byte buffer capped at
/// `max_file_size`.
pub struct MemSdCard {
    mounted: bool,
    max_file_size: usize,
    max_files: usize,
    state: Mutex<MemSdCardState>,
}

struct MemSdCardState {
    files: std::collections::VecDeque<Vec<u8>>,
}

impl MemSdCard {
    pub fn new(mounted: bool, max_file_size: usize, max_files: usize) -> Self {
        Self {
            mounted,
            max_file_size,
            max_files,
            state: Mutex::new(MemSdCardState { files: std::collections::VecDeque::from([Vec::new()]) }),
        }
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.state.lock().unwrap().files.iter().map(|f| f.len()).sum()
    }
}

impl SdCardSink for MemSdCard {
    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn append(&self, data: &[u8]) -> bool {
        if !self.mounted {
            return false;
        }
        let mut state = self.state.lock().unwrap();
        let needs_rotation = state.files.back().map(|f| f.len() + data.len() > self.max_file_size).unwrap_or(true);
        if needs_rotation {
            if state.files.len() >= self.max_files {
                state.files.pop_front();
            }
            state.files.push_back(Vec::new());
        }
        state.files.back_mut().unwrap().extend_from_slice(data);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmounted_card_rejects_writes() {
        let card = MemSdCard::new(false, 1024, 4);
        assert!(!card.append(b"hello"));
    }

    #[test]
    fn rotates_and_unlinks_oldest_when_full() {
        let card = MemSdCard::new(true, 4, 2);
        for _ in 0..6 {
            assert!(card.append(b"ab"));
        }
        assert!(card.file_count() <= 2);
    }
}
