//! Buffer-ready signaling between the Frame Source and the acquisition loop.
//!
//! The Frame Source runs its own notification context (an interrupt handler on real
//! hardware, a producer thread in the mock) and reports every event through
//! [`BufferReadySignal::notify`]. The acquisition loop is the single consumer and
//! reads the shared [`AcquisitionContext`].
//!
//! # Contract
//!
//! - `notify()` performs no I/O, allocates nothing and never blocks. The wake mutex
//!   is only `try_lock`ed; if the consumer happens to hold it, the wake-up is picked
//!   up at the consumer's next poll interval instead.
//! - `completed_count` only ever increases.
//! - `ready` is set by the producer and cleared by the consumer, once per cycle.
//!
//! ```text
//! Producer (IRQ / thread)             Consumer (acquisition loop)
//!     │ notify(BUFFER_READY)               │ wait_for_event(poll)
//!     ├─ completed += 1                    │   └─ Condvar::wait_for
//!     ├─ ready = true                      │ clear_ready()
//!     └─ try_lock + notify_all ──────────► │ completed_count()
//! ```

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

bitflags! {
    /// Event kinds a Frame Source can report in one notification.
    ///
    /// Several bits may be set at once; every present bit is handled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        /// A capture buffer has been completely written.
        const BUFFER_READY = 1 << 0;
        /// The device FIFO overflowed; image data is corrupt.
        const FIFO_OVERFLOW = 1 << 1;
    }
}

/// Shared state record mutated by the producer and read by the loop.
#[derive(Debug, Default)]
pub struct AcquisitionContext {
    completed: AtomicU64,
    ready: AtomicBool,
    overflow: AtomicBool,
    stop_requested: AtomicBool,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

impl AcquisitionContext {
    /// Create a fresh context for one acquisition session.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total buffers the source has reported complete since the session began.
    #[inline]
    #[must_use]
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether a buffer completed since the loop last cleared the flag.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether the source reported a FIFO overflow.
    #[inline]
    #[must_use]
    pub fn is_overflowed(&self) -> bool {
        self.overflow.load(Ordering::Acquire)
    }

    /// Whether an operator abort has been requested.
    #[inline]
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Clear the ready flag. Only the consumer calls this, once per cycle.
    pub(crate) fn clear_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }

    fn has_pending_event(&self) -> bool {
        self.is_ready() || self.is_overflowed() || self.stop_requested()
    }

    /// Block until ready, overflow or stop is observed, or `timeout` elapses.
    ///
    /// Returns `true` if one of the three conditions holds on return.
    pub fn wait_for_event(&self, timeout: Duration) -> bool {
        let mut guard = self.wake_lock.lock();
        if !self.has_pending_event() {
            let _ = self.wake.wait_for(&mut guard, timeout);
        }
        self.has_pending_event()
    }

    fn wake_consumer(&self) {
        // Never block the producer. If the consumer holds the lock it is between its
        // predicate check and its wait; the poll interval bounds the delay.
        let _guard = self.wake_lock.try_lock();
        self.wake.notify_all();
    }
}

/// Producer-side handle registered with the Frame Source.
#[derive(Debug, Clone)]
pub struct BufferReadySignal {
    context: Arc<AcquisitionContext>,
}

impl BufferReadySignal {
    /// Create a signal that updates `context`.
    #[must_use]
    pub fn new(context: Arc<AcquisitionContext>) -> Self {
        Self { context }
    }

    /// Report one hardware event.
    ///
    /// Called from the producer's notification path; returns promptly.
    pub fn notify(&self, mask: EventMask) {
        let ctx = &self.context;
        if mask.contains(EventMask::BUFFER_READY) {
            ctx.completed.fetch_add(1, Ordering::AcqRel);
            ctx.ready.store(true, Ordering::Release);
        }
        if mask.contains(EventMask::FIFO_OVERFLOW) {
            ctx.overflow.store(true, Ordering::Release);
        }
        if mask.intersects(EventMask::BUFFER_READY | EventMask::FIFO_OVERFLOW) {
            ctx.wake_consumer();
        }
    }
}

/// Operator kill switch for a running session.
#[derive(Debug, Clone)]
pub struct StopHandle {
    context: Arc<AcquisitionContext>,
}

impl StopHandle {
    /// Create a stop handle for `context`.
    #[must_use]
    pub fn new(context: Arc<AcquisitionContext>) -> Self {
        Self { context }
    }

    /// Ask the loop to stop. Observed within one wake/poll interval.
    pub fn request_stop(&self) {
        self.context.stop_requested.store(true, Ordering::Release);
        let _guard = self.context.wake_lock.lock();
        self.context.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_buffer_ready_increments_and_sets_flag() {
        let ctx = AcquisitionContext::new();
        let signal = BufferReadySignal::new(ctx.clone());

        signal.notify(EventMask::BUFFER_READY);
        signal.notify(EventMask::BUFFER_READY);

        assert_eq!(ctx.completed_count(), 2);
        assert!(ctx.is_ready());
        assert!(!ctx.is_overflowed());
    }

    #[test]
    fn test_combined_mask_handles_every_bit() {
        let ctx = AcquisitionContext::new();
        let signal = BufferReadySignal::new(ctx.clone());

        signal.notify(EventMask::BUFFER_READY | EventMask::FIFO_OVERFLOW);

        assert_eq!(ctx.completed_count(), 1);
        assert!(ctx.is_ready());
        assert!(ctx.is_overflowed());
    }

    #[test]
    fn test_overflow_alone_does_not_count_buffer() {
        let ctx = AcquisitionContext::new();
        BufferReadySignal::new(ctx.clone()).notify(EventMask::FIFO_OVERFLOW);

        assert_eq!(ctx.completed_count(), 0);
        assert!(!ctx.is_ready());
        assert!(ctx.is_overflowed());
    }

    #[test]
    fn test_clear_ready_keeps_count() {
        let ctx = AcquisitionContext::new();
        BufferReadySignal::new(ctx.clone()).notify(EventMask::BUFFER_READY);

        ctx.clear_ready();

        assert!(!ctx.is_ready());
        assert_eq!(ctx.completed_count(), 1);
    }

    #[test]
    fn test_concurrent_producers_never_lose_counts() {
        let ctx = AcquisitionContext::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let signal = BufferReadySignal::new(ctx.clone());
                thread::spawn(move || {
                    for _ in 0..1000 {
                        signal.notify(EventMask::BUFFER_READY);
                    }
                })
            })
            .collect();

        let mut last = 0;
        while handles.iter().any(|h| !h.is_finished()) {
            let now = ctx.completed_count();
            assert!(now >= last, "completed count went backwards");
            last = now;
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ctx.completed_count(), 4000);
    }

    #[test]
    fn test_wait_times_out_without_events() {
        let ctx = AcquisitionContext::new();
        let start = Instant::now();

        assert!(!ctx.wait_for_event(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_wait_wakes_on_notify() {
        let ctx = AcquisitionContext::new();
        let signal = BufferReadySignal::new(ctx.clone());

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signal.notify(EventMask::BUFFER_READY);
        });

        let start = Instant::now();
        let mut woke = false;
        while !woke && start.elapsed() < Duration::from_secs(5) {
            woke = ctx.wait_for_event(Duration::from_millis(500));
        }
        producer.join().unwrap();

        assert!(woke);
        assert!(ctx.is_ready());
    }

    #[test]
    fn test_stop_handle_wakes_waiter() {
        let ctx = AcquisitionContext::new();
        let stop = StopHandle::new(ctx.clone());

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stop.request_stop();
        });

        let start = Instant::now();
        let mut woke = false;
        while !woke && start.elapsed() < Duration::from_secs(5) {
            woke = ctx.wait_for_event(Duration::from_millis(500));
        }
        stopper.join().unwrap();

        assert!(woke);
        assert!(ctx.stop_requested());
        assert!(!ctx.is_ready());
    }
}
