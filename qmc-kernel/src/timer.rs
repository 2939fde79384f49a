use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A one-shot or periodic software timer (spec §4.1: `timer_create`/
/// `timer_start`/`timer_stop`). Used directly by C3's rate-limiting
/// one-shot suppression window and by C2/C4's periodic sampling ticks.
pub struct Timer {
    stop: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    /// Spawns a task that invokes `cb` after `period`, and then every
    /// `period` again if `periodic` is true, until `stop` is called.
    pub fn start<F, Fut>(period: Duration, periodic: bool, mut cb: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let stop = Arc::new(Notify::new());
        let stop_wait = stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        cb().await;
                        if !periodic {
                            break;
                        }
                    }
                    _ = stop_wait.notified() => break,
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Cancels the timer. Safe to call more than once.
    pub fn stop(&mut self) {
        self.stop.notify_waiters();
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn one_shot_fires_exactly_once() {
        let count = Arc::new(AtomicU32::new(0));
        let c2 = count.clone();
        let mut t = Timer::start(Duration::from_millis(5), false, move || {
            let c3 = c2.clone();
            async move {
                c3.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        t.stop();
    }

    #[tokio::test]
    async fn periodic_fires_multiple_times_until_stopped() {
        let count = Arc::new(AtomicU32::new(0));
        let c2 = count.clone();
        let mut t = Timer::start(Duration::from_millis(5), true, move || {
            let c3 = c2.clone();
            async move {
                c3.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(35)).await;
        t.stop();
        let n = count.load(Ordering::SeqCst);
        assert!(n >= 3, "expected several periodic fires, got {n}");
    }
}
