use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A lock-free single-producer/single-consumer ring buffer of fixed
/// capacity, for the ISR→task edge that spec §9's Design Notes require to
/// be lock-free (the `FaultBuffer`, spec §3/§4.3).
///
/// Only one thread may ever call `push` (the "ISR" side) and only one
/// thread may ever call `pop` (the fault-handling task). Capacity is
/// rounded up internally; nothing here allocates after construction.
pub struct SpscRing<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: usize,
    head: AtomicUsize, // next slot to pop
    tail: AtomicUsize, // next slot to push
}

unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SpscRing capacity must be nonzero");
        let mut v = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            v.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        Self {
            buf: v.into_boxed_slice(),
            capacity,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot_count(&self) -> usize {
        // One slot is kept empty to distinguish full from empty.
        self.capacity + 1
    }

    fn idx(&self, raw: usize) -> usize {
        raw % self.slot_count()
    }

    /// Pushes a value from the single producer. Returns the value back
    /// (without writing it) if the ring is full — callers treat that as
    /// an overflow and bump `SystemFaultStatus`'s overflow bit (spec §3).
    pub fn push(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let next = self.idx(tail + 1);
        if next == self.idx(head) {
            return Err(value);
        }
        let slot = self.idx(tail);
        unsafe {
            (*self.buf[slot].get()).write(value);
        }
        self.tail.store(next, Ordering::Release);
        Ok(())
    }

    /// Pops a value from the single consumer, or `None` if empty.
    pub fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if self.idx(head) == self.idx(tail) {
            return None;
        }
        let slot = self.idx(head);
        let value = unsafe { (*self.buf[slot].get()).assume_init_read() };
        self.head.store(self.idx(head + 1), Ordering::Release);
        Some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.idx(self.head.load(Ordering::Acquire)) == self.idx(self.tail.load(Ordering::Acquire))
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_fifo() {
        let r: SpscRing<u32> = SpscRing::new(4);
        r.push(1).unwrap();
        r.push(2).unwrap();
        assert_eq!(r.pop(), Some(1));
        assert_eq!(r.pop(), Some(2));
        assert_eq!(r.pop(), None);
    }

    #[test]
    fn overflow_returns_value() {
        let r: SpscRing<u32> = SpscRing::new(2);
        r.push(1).unwrap();
        r.push(2).unwrap();
        assert_eq!(r.push(3), Err(3));
    }

    #[test]
    fn drains_to_empty_after_full_cycle() {
        let r: SpscRing<u32> = SpscRing::new(3);
        for i in 0..3 {
            r.push(i).unwrap();
        }
        assert!(r.push(99).is_err());
        for i in 0..3 {
            assert_eq!(r.pop(), Some(i));
        }
        assert!(r.is_empty());
        r.push(100).unwrap();
        assert_eq!(r.pop(), Some(100));
    }
}
