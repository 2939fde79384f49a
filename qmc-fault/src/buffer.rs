use std::time::Duration;

use qmc_kernel::{Queue, SpscRing};

use crate::types::FaultSource;

/// ISR-filled, single-producer/single-consumer (spec §3 `FaultBuffer`,
/// §9 Design Notes: "must be lock-free").
pub struct FaultBuffer {
    ring: SpscRing<FaultSource>,
}

impl FaultBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { ring: SpscRing::new(capacity) }
    }

    /// `fault_raise_isr`'s storage half: returns the source back on
    /// overflow so the caller can set the sticky overflow bit.
    pub fn push(&self, src: FaultSource) -> Result<(), FaultSource> {
        self.ring.push(src)
    }

    pub fn pop(&self) -> Option<FaultSource> {
        self.ring.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

/// Task-context, multi-producer fault queue (spec §3 `FaultQueue`).
pub struct FaultQueue {
    queue: std::sync::Arc<Queue<FaultSource>>,
}

impl FaultQueue {
    pub fn new(capacity: usize) -> Self {
        Self { queue: Queue::new(capacity) }
    }

    /// `fault_raise`'s storage half: `NoMem` on overflow, matching
    /// `Queue::send`'s non-blocking contract.
    pub async fn push(&self, src: FaultSource) -> qmc_kernel::error::QmcResult<()> {
        self.queue.send(src, Duration::ZERO).await
    }

    pub async fn pop_nonblocking(&self) -> Option<FaultSource> {
        self.queue.recv(Duration::ZERO).await.ok()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.is_empty().await
    }
}
