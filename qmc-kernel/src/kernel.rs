use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::watchdog::WatchdogRegistry;

/// The top-level task-spawning substrate every subsystem is handed a
/// reference to at init (spec §9's Design Notes: "explicit context
/// structs ... no hidden globals"). Wraps `tokio::spawn` the way the
/// original wraps FreeRTOS `xTaskCreate`, assigning each task a stable
/// numeric id for diagnostics.
pub struct Kernel {
    next_task_id: AtomicU64,
    pub watchdog: WatchdogRegistry,
}

impl Kernel {
    pub fn new() -> Self {
        Self {
            next_task_id: AtomicU64::new(1),
            watchdog: WatchdogRegistry::new(),
        }
    }

    /// Spawns a named, priority-tagged task. Priority is metadata only in
    /// this rewrite (tokio's multi-threaded scheduler is cooperative, not
    /// priority-preemptive); it is retained and logged so the mapping
    /// back to the original's task-priority table stays legible.
    pub fn spawn<F>(&self, name: &'static str, priority: u8, fut: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        debug!(task_id = id, task = name, priority, "spawning task");
        tokio::spawn(fut)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
