//! Test pattern generation for simulated 8-bit frames.
//!
//! Each frame is a dim noisy gradient with a square "indicator LED" that blinks
//! at a fixed period, followed by the counters the camera firmware would stamp into
//! the first pixels.

use capture_core::decoder::{CounterField, FrameMetadata, MetadataLayout};
use capture_core::roi::{RoiRect, RoiSettings};

/// Simple pseudo-random number generator (LCG) for reproducible noise.
/// Uses the same algorithm as glibc for predictable cross-platform behavior.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff
}

/// Blinking indicator drawn into every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedPattern {
    /// Region covered by the LED.
    pub rect: RoiRect,
    /// Full on/off cycle in frames (0 keeps the LED off).
    pub period_frames: u32,
    /// Pixel value while lit.
    pub on_level: u8,
    /// Pixel value while dark.
    pub off_level: u8,
}

impl Default for LedPattern {
    fn default() -> Self {
        Self {
            rect: RoiSettings::default().rect,
            period_frames: 100,
            on_level: 240,
            off_level: 16,
        }
    }
}

impl LedPattern {
    /// Whether the LED is lit in frame `index` (first half of each period).
    pub fn is_on(&self, index: u64) -> bool {
        if self.period_frames == 0 {
            return false;
        }
        let period = u64::from(self.period_frames);
        index % period < period.div_ceil(2)
    }
}

/// Render frame `index` into `buf` (row-major, `width * height` bytes).
///
/// The background stays below 128 so only the LED can cross a typical threshold.
pub fn render_frame(buf: &mut [u8], width: u32, height: u32, index: u64, led: &LedPattern) {
    let w = width as usize;
    let h = height as usize;
    let frame_seed = index.wrapping_mul(2654435761);

    for (y, row) in buf.chunks_exact_mut(w).take(h).enumerate() {
        for (x, px) in row.iter_mut().enumerate() {
            let gradient = ((x + y) * 96 / (w + h).max(1)) as i32;
            let noise = (prng(frame_seed ^ ((y * w + x) as u64)) & 0x7) as i32 - 4;
            *px = (gradient + 16 + noise).clamp(0, 127) as u8;
        }
    }

    let level = if led.is_on(index) { led.on_level } else { led.off_level };
    let x0 = (led.rect.x as usize).min(w);
    let x1 = (led.rect.x as usize + led.rect.width as usize).min(w);
    let y0 = (led.rect.y as usize).min(h);
    let y1 = (led.rect.y as usize + led.rect.height as usize).min(h);
    for y in y0..y1 {
        buf[y * w + x0..y * w + x1].fill(level);
    }
}

fn write_field(buf: &mut [u8], field: &CounterField, value: u32) {
    let le = value.to_le_bytes();
    buf[field.offset..field.end()].copy_from_slice(&le[..field.width]);
}

/// Stamp `metadata` into the leading bytes of `buf` per `layout`.
///
/// Values wider than their field are truncated, as the firmware does with the
/// 24-bit frame counter.
pub fn stamp_metadata(buf: &mut [u8], layout: &MetadataLayout, metadata: &FrameMetadata) {
    write_field(buf, &layout.frame_counter, metadata.frame_counter);
    write_field(buf, &layout.device_time, metadata.device_time_ticks);
    write_field(buf, &layout.frame_tag, metadata.frame_tag);
}
