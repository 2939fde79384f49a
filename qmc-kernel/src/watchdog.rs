use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The functional-watchdog kick-slot registry of spec §4.9: every
/// best-effort task owns a slot and is expected to call `kick` at least
/// once per activation. `overdue_slots` lets C9's supervisor loop decide
/// when to log `FunctionalWatchdogKickFailed`.
pub struct WatchdogRegistry {
    slots: Mutex<HashMap<&'static str, Instant>>,
}

impl WatchdogRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new kick slot, to be called once per owning task at
    /// startup.
    pub fn register(&self, name: &'static str) {
        self.slots.lock().unwrap().insert(name, Instant::now());
    }

    /// Records a kick for `name`. A kick for an unregistered slot is a
    /// programming error in the caller and is ignored rather than
    /// panicking, matching the kernel's "never panic on a caller mistake
    /// in a public entry" posture.
    pub fn kick(&self, name: &'static str) {
        if let Some(t) = self.slots.lock().unwrap().get_mut(name) {
            *t = Instant::now();
        }
    }

    /// Returns the names of every slot that hasn't been kicked within
    /// `max_age`.
    pub fn overdue_slots(&self, max_age: Duration) -> Vec<&'static str> {
        let now = Instant::now();
        self.slots
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > max_age)
            .map(|(name, _)| *name)
            .collect()
    }
}

impl Default for WatchdogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_kick_is_not_overdue() {
        let wd = WatchdogRegistry::new();
        wd.register("datahub");
        wd.kick("datahub");
        assert!(wd.overdue_slots(Duration::from_millis(50)).is_empty());
    }

    #[test]
    fn stale_slot_is_reported_overdue() {
        let wd = WatchdogRegistry::new();
        wd.register("board");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(wd.overdue_slots(Duration::from_millis(5)), vec!["board"]);
    }
}
