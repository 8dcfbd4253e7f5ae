//! Windowed frame-rate estimators.
//!
//! Two independent estimates are kept per session:
//!
//! - **Device rate**: delta of the device-stamped frame counter per window. Counts
//!   every frame the camera produced, including frames the consumer discarded.
//! - **Calculated rate**: delta of a consumer-side tally per window. The tally only
//!   advances when the embedded frame tag changes, so a re-delivered frame does not
//!   count twice.
//!
//! Both use the same [`RateWindow`] state machine:
//!
//! ```text
//!   ACCUMULATING ──(elapsed >= window)──► REPORTED ──(reset start + baseline)──► ACCUMULATING
//! ```
//!
//! Between reports the last rate is held. Timestamps are passed in by the caller so
//! the estimators stay deterministic under test.

use crate::decoder::FrameMetadata;
use crate::limits::RATE_WINDOW;
use std::time::{Duration, Instant};

/// What a single observation did to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUpdate {
    /// Still inside the window; rate unchanged.
    Accumulating,
    /// Window closed; new rate reported.
    Reported(u32),
    /// The counter went backwards; the window restarted from this sample.
    Resynchronized,
}

/// One windowed counter-delta estimator.
#[derive(Debug, Clone)]
pub struct RateWindow {
    window: Duration,
    window_start: Instant,
    baseline: Option<u32>,
    last_sample: Option<u32>,
    rate: u32,
}

impl RateWindow {
    /// Start a one-second window at `now`.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self::with_window(now, RATE_WINDOW)
    }

    /// Start a window of arbitrary length at `now`.
    #[must_use]
    pub fn with_window(now: Instant, window: Duration) -> Self {
        Self {
            window,
            window_start: now,
            baseline: None,
            last_sample: None,
            rate: 0,
        }
    }

    /// Last reported rate (0 before the first window closes).
    #[inline]
    #[must_use]
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Feed the current counter value.
    pub fn observe(&mut self, counter: u32, now: Instant) -> RateUpdate {
        let baseline = *self.baseline.get_or_insert(counter);

        if self.last_sample.is_some_and(|last| counter < last) {
            tracing::warn!(
                previous = self.last_sample,
                counter,
                "Frame counter decreased, resynchronizing rate window"
            );
            self.resync(counter, now);
            return RateUpdate::Resynchronized;
        }
        self.last_sample = Some(counter);

        if now.saturating_duration_since(self.window_start) < self.window {
            return RateUpdate::Accumulating;
        }

        self.rate = counter - baseline;
        self.baseline = Some(counter);
        self.window_start = now;
        RateUpdate::Reported(self.rate)
    }

    fn resync(&mut self, counter: u32, now: Instant) {
        self.baseline = Some(counter);
        self.last_sample = Some(counter);
        self.window_start = now;
    }
}

/// Rate from consumer-observed unique frames.
#[derive(Debug, Clone)]
pub struct CalculatedRate {
    window: RateWindow,
    last_tag: Option<u32>,
    tally: u32,
}

impl CalculatedRate {
    /// Start the estimator at `now`.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            window: RateWindow::new(now),
            last_tag: None,
            tally: 0,
        }
    }

    /// Unique frames observed so far.
    #[must_use]
    pub fn tally(&self) -> u32 {
        self.tally
    }

    /// Last reported rate.
    #[must_use]
    pub fn rate(&self) -> u32 {
        self.window.rate()
    }

    /// Feed the tag of a decoded frame. Duplicate tags leave the tally untouched.
    pub fn observe(&mut self, tag: u32, now: Instant) -> RateUpdate {
        if self.last_tag != Some(tag) {
            self.last_tag = Some(tag);
            self.tally = self.tally.wrapping_add(1);
        }
        self.window.observe(self.tally, now)
    }
}

/// Both rates after one observation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rates {
    /// Frames per second reported by the device counter.
    pub device: u32,
    /// Unique frames per second observed by the consumer.
    pub calculated: u32,
}

/// The device and calculated estimators driven together.
#[derive(Debug, Clone)]
pub struct RateEstimators {
    device: RateWindow,
    calculated: CalculatedRate,
}

impl RateEstimators {
    /// Start both windows at `now`.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            device: RateWindow::new(now),
            calculated: CalculatedRate::new(now),
        }
    }

    /// Feed one decoded frame.
    pub fn observe(&mut self, metadata: &FrameMetadata, now: Instant) -> Rates {
        self.device.observe(metadata.frame_counter, now);
        self.calculated.observe(metadata.frame_tag, now);
        self.current()
    }

    /// Rates as last reported.
    #[must_use]
    pub fn current(&self) -> Rates {
        Rates {
            device: self.device.rate(),
            calculated: self.calculated.rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(start: Instant, micros: u64) -> Instant {
        start + Duration::from_micros(micros)
    }

    #[test]
    fn test_rate_held_inside_window() {
        let start = Instant::now();
        let mut window = RateWindow::new(start);

        assert_eq!(window.observe(0, start), RateUpdate::Accumulating);
        assert_eq!(window.observe(50, at(start, 500_000)), RateUpdate::Accumulating);
        assert_eq!(window.rate(), 0);
        assert_eq!(window.observe(99, at(start, 999_999)), RateUpdate::Accumulating);
        assert_eq!(window.observe(100, at(start, 1_000_000)), RateUpdate::Reported(100));
        assert_eq!(window.observe(120, at(start, 1_200_000)), RateUpdate::Accumulating);
        assert_eq!(window.rate(), 100);
    }

    #[test]
    fn test_constant_rate_converges() {
        for k in [10u64, 60, 182, 949] {
            let start = Instant::now();
            let mut window = RateWindow::new(start);
            let mut reports = Vec::new();

            // Four windows of frames at exactly k per second.
            for i in 0..=(4 * k) {
                let t = at(start, i * 1_000_000 / k);
                if let RateUpdate::Reported(rate) = window.observe(i as u32, t) {
                    reports.push(rate);
                }
            }

            assert!(reports.len() >= 3, "k={} reports={:?}", k, reports);
            for rate in reports {
                assert!(
                    (rate as i64 - k as i64).abs() <= 1,
                    "k={} rate={}",
                    k,
                    rate
                );
            }
        }
    }

    #[test]
    fn test_counter_decrease_resynchronizes() {
        let start = Instant::now();
        let mut window = RateWindow::new(start);

        window.observe(0xFF_FFF0, start);
        window.observe(0xFF_FFFF, at(start, 1_000_000));
        assert_eq!(window.rate(), 15);

        // 24-bit wrap
        assert_eq!(window.observe(3, at(start, 1_100_000)), RateUpdate::Resynchronized);
        assert_eq!(window.rate(), 15, "rate is held across a resync");

        assert_eq!(window.observe(103, at(start, 2_100_000)), RateUpdate::Reported(100));
    }

    #[test]
    fn test_first_sample_sets_baseline() {
        let start = Instant::now();
        let mut window = RateWindow::new(start);

        window.observe(5_000, start);
        assert_eq!(window.observe(5_030, at(start, 1_000_000)), RateUpdate::Reported(30));
    }

    #[test]
    fn test_duplicate_tags_do_not_count() {
        let start = Instant::now();
        let mut calc = CalculatedRate::new(start);

        calc.observe(7, start);
        calc.observe(7, at(start, 1_000));
        calc.observe(7, at(start, 2_000));
        assert_eq!(calc.tally(), 1);

        calc.observe(8, at(start, 3_000));
        calc.observe(8, at(start, 4_000));
        assert_eq!(calc.tally(), 2);
    }

    #[test]
    fn test_calculated_rate_counts_unique_frames_only() {
        let start = Instant::now();
        let mut calc = CalculatedRate::new(start);

        // 100 unique frames per second, each delivered twice.
        for i in 0..=200u64 {
            let t = at(start, i * 10_000);
            calc.observe(i as u32, t);
            calc.observe(i as u32, t);
        }

        assert_eq!(calc.rate(), 100);
    }

    #[test]
    fn test_estimators_are_independent() {
        let start = Instant::now();
        let mut rates = RateEstimators::new(start);

        // Device counter advances by 5 per decoded frame (consumer drops 4 of 5),
        // tag changes every decoded frame.
        for i in 0..=100u32 {
            let meta = FrameMetadata {
                frame_counter: i * 5,
                device_time_ticks: 0,
                frame_tag: i,
            };
            rates.observe(&meta, at(start, u64::from(i) * 10_000));
        }

        assert_eq!(rates.current(), Rates { device: 500, calculated: 100 });
    }
}
