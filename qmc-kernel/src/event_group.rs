use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

use crate::error::{QmcError, QmcResult};

/// Whether `event_wait` wakes on any requested bit or requires all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    Any,
    All,
}

/// A FreeRTOS-style event-flag group: up to `u32::BITS` independently
/// set/clearable bits, with blocking waits on any/all of a mask (spec
/// §4.1). `SystemStatus` (spec §3) layers a 24-bit invariant on top of
/// this general-purpose primitive rather than the primitive enforcing it
/// itself, so other event groups in the workspace aren't arbitrarily
/// capped at 24 bits.
pub struct EventGroup {
    bits: AtomicU32,
    changed: Notify,
}

impl EventGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            bits: AtomicU32::new(0),
            changed: Notify::new(),
        })
    }

    pub fn get(&self) -> u32 {
        self.bits.load(Ordering::SeqCst)
    }

    pub fn set(&self, mask: u32) {
        self.bits.fetch_or(mask, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn clear(&self, mask: u32) {
        self.bits.fetch_and(!mask, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    fn satisfied(bits: u32, mask: u32, mode: WaitMode) -> bool {
        match mode {
            WaitMode::Any => bits & mask != 0,
            WaitMode::All => bits & mask == mask,
        }
    }

    /// Blocks until `mask` is satisfied per `mode`, or `to` elapses.
    /// When `clear_on_exit` is set, the satisfied bits are atomically
    /// cleared before returning (spec §4.1's `clear` parameter).
    pub async fn wait(
        &self,
        mask: u32,
        mode: WaitMode,
        clear_on_exit: bool,
        to: Duration,
    ) -> QmcResult<u32> {
        let deadline = tokio::time::Instant::now() + to;
        loop {
            let bits = self.bits.load(Ordering::SeqCst);
            if Self::satisfied(bits, mask, mode) {
                if clear_on_exit {
                    self.bits.fetch_and(!(bits & mask), Ordering::SeqCst);
                }
                return Ok(bits);
            }
            if to.is_zero() {
                return Err(QmcError::Timeout);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(QmcError::Timeout);
            }
            // Subscribe before re-checking to avoid missing a concurrent set.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let bits = self.bits.load(Ordering::SeqCst);
            if Self::satisfied(bits, mask, mode) {
                if clear_on_exit {
                    self.bits.fetch_and(!(bits & mask), Ordering::SeqCst);
                }
                return Ok(bits);
            }
            if timeout(remaining, notified).await.is_err() {
                return Err(QmcError::Timeout);
            }
        }
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self {
            bits: AtomicU32::new(0),
            changed: Notify::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_wait_any_returns_immediately() {
        let eg = EventGroup::new();
        eg.set(0b0101);
        let bits = eg
            .wait(0b0100, WaitMode::Any, false, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(bits & 0b0100, 0b0100);
    }

    #[tokio::test]
    async fn wait_all_requires_every_bit() {
        let eg = EventGroup::new();
        eg.set(0b0001);
        let err = eg
            .wait(0b0011, WaitMode::All, false, Duration::from_millis(5))
            .await
            .unwrap_err();
        assert_eq!(err, QmcError::Timeout);
        eg.set(0b0010);
        eg.wait(0b0011, WaitMode::All, false, Duration::ZERO)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn clear_on_exit_consumes_only_requested_bits() {
        let eg = EventGroup::new();
        eg.set(0b0111);
        eg.wait(0b0001, WaitMode::Any, true, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(eg.get(), 0b0110);
    }

    #[tokio::test]
    async fn wakes_up_on_concurrent_set() {
        let eg = EventGroup::new();
        let eg2 = eg.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            eg2.set(0b1);
        });
        let bits = eg
            .wait(0b1, WaitMode::Any, false, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(bits, 0b1);
    }
}
