//! Frame timing for the simulated grabber.
//!
//! Derives the producer period and the embedded device-clock advance from the
//! camera frame rate.

use std::time::Duration;

/// Default device clock (25 MHz, 40 ns per tick)
pub const DEVICE_CLOCK_HZ: u64 = 25_000_000;

/// Timing of a free-running camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// Frames per second
    pub fps: u32,
    /// Device clock frequency stamped into frames
    pub clock_hz: u64,
}

impl FrameTiming {
    /// Timing for a camera running at `fps` with the default device clock
    pub fn camera(fps: u32) -> Self {
        Self {
            fps,
            clock_hz: DEVICE_CLOCK_HZ,
        }
    }

    /// Time between frames
    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.fps.max(1)))
    }

    /// Device clock value at frame `index` (wraps at 32 bits like the hardware counter)
    pub fn ticks_at(&self, index: u64) -> u32 {
        let ticks = u128::from(index) * u128::from(self.clock_hz) / u128::from(self.fps.max(1));
        ticks as u32
    }
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::camera(949)
    }
}
