use std::time::Duration;

use tokio::sync::Mutex;

use qmc_kernel::error::{QmcError, QmcResult};
use qmc_kernel::Queue;

use crate::types::EncryptedLogRecord;

/// `DATALOGGER_RCV_QUEUE_CN` (spec §4.5): the number of dynamic fan-out
/// queues a log consumer (REST log tail, MQTT bridge, USB export) can
/// hold open at once, mirrored on `qmc-datahub`'s `MAX_STATUS_QUEUES`
/// pool pattern.
pub const MAX_LOG_QUEUES: usize = 4;

const LOG_QUEUE_DEPTH: usize = 16;

/// Opaque handle to one registered fan-out slot (`LOG_GetNewLoggingQueueHandle`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQueueHandle(usize);

/// The dynamic fan-out pool every successfully-exported record is
/// broadcast to (spec §4.5 step 5: "fan out to each allocated queue").
/// An overrun on any one queue sets `SYSEVENT_LOG_MessageLost` for that
/// consumer rather than blocking the writer.
pub struct LogFanout {
    slots: Mutex<[Option<std::sync::Arc<Queue<EncryptedLogRecord>>>; MAX_LOG_QUEUES]>,
}

impl LogFanout {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self { slots: Mutex::new(std::array::from_fn(|_| None)) })
    }

    /// `LOG_GetNewLoggingQueueHandle`.
    pub async fn get_new_queue(&self) -> QmcResult<LogQueueHandle> {
        let mut slots = self.slots.lock().await;
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Queue::new(LOG_QUEUE_DEPTH));
                return Ok(LogQueueHandle(i));
            }
        }
        Err(QmcError::NoMem)
    }

    /// `LOG_ReturnLoggingQueueHandle`.
    pub async fn return_queue(&self, handle: LogQueueHandle) -> QmcResult<()> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(handle.0).and_then(|s| s.take()).ok_or(QmcError::ArgInvalid)?;
        slot.drain().await;
        Ok(())
    }

    /// Whether any consumer currently has a dynamic queue allocated
    /// (`gs_DataloggerDqAlloc`) — gates whether the pipeline bothers
    /// doing the encryption work for step 2 at all.
    pub async fn has_subscribers(&self) -> bool {
        self.slots.lock().await.iter().any(|s| s.is_some())
    }

    /// Broadcasts one encrypted record to every allocated queue.
    /// Returns the count of queues that overran (each caller is
    /// responsible for raising `SYSEVENT_LOG_MessageLost` for its own
    /// consumer-facing reporting).
    pub async fn publish(&self, record: &EncryptedLogRecord) -> usize {
        let slots = self.slots.lock().await;
        let mut lost = 0;
        for slot in slots.iter().flatten() {
            if slot.send(record.clone(), Duration::ZERO).await.is_err() {
                lost += 1;
            }
        }
        lost
    }

    pub async fn dequeue(&self, handle: LogQueueHandle, to: Duration) -> QmcResult<EncryptedLogRecord> {
        let queue = {
            let slots = self.slots.lock().await;
            slots.get(handle.0).and_then(|s| s.as_ref()).map(|s| s.clone()).ok_or(QmcError::ArgInvalid)?
        };
        queue.recv(to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EncryptedLogRecord;

    fn sample() -> EncryptedLogRecord {
        EncryptedLogRecord { length: 0, keyiv_enc: vec![], record_enc: vec![], signature: vec![] }
    }

    #[tokio::test]
    async fn pool_exhausts_and_frees() {
        let fanout = LogFanout::new();
        let mut handles = vec![];
        for _ in 0..MAX_LOG_QUEUES {
            handles.push(fanout.get_new_queue().await.unwrap());
        }
        assert_eq!(fanout.get_new_queue().await.unwrap_err(), QmcError::NoMem);
        fanout.return_queue(handles.pop().unwrap()).await.unwrap();
        fanout.get_new_queue().await.unwrap();
    }

    #[tokio::test]
    async fn publish_fans_out_to_every_subscriber() {
        let fanout = LogFanout::new();
        let a = fanout.get_new_queue().await.unwrap();
        let b = fanout.get_new_queue().await.unwrap();
        assert!(fanout.has_subscribers().await);
        fanout.publish(&sample()).await;
        fanout.dequeue(a, Duration::ZERO).await.unwrap();
        fanout.dequeue(b, Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn no_subscribers_reports_empty() {
        let fanout = LogFanout::new();
        assert!(!fanout.has_subscribers().await);
    }
}
