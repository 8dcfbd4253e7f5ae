//! Frame decoding: pixel grid copy and in-image metadata extraction.
//!
//! The camera firmware stamps counters into the first bytes of every image. Their
//! positions are a protocol contract with the firmware, so they live in a
//! [`MetadataLayout`] rather than being hard-coded at the read sites.
//!
//! # Default Layout
//!
//! | Field            | Offset | Width | Meaning                                 |
//! |------------------|--------|-------|-----------------------------------------|
//! | `frame_counter`  | 0      | 3     | Device frame number, zero-extended      |
//! | `device_time`    | 4      | 4     | Device clock ticks (25 MHz, 40 ns/tick) |
//! | `frame_tag`      | 10     | 4     | Per-unique-frame tag                    |
//!
//! All fields are little-endian.

use crate::config::FrameGeometry;
use crate::error::{CaptureError, CaptureResult};
use crate::limits::validate_frame_size;
use serde::{Deserialize, Serialize};

/// Position of one little-endian counter inside the pixel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterField {
    /// Byte offset from the start of the payload.
    pub offset: usize,
    /// Width in bytes (1 to 4); narrower fields are zero-extended.
    pub width: usize,
}

impl CounterField {
    /// Create a field descriptor.
    #[must_use]
    pub const fn new(offset: usize, width: usize) -> Self {
        Self { offset, width }
    }

    /// One past the last byte this field reads.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.width
    }

    /// Read the field from `bytes`. The caller guarantees `bytes.len() >= self.end()`.
    #[inline]
    #[must_use]
    pub fn read(&self, bytes: &[u8]) -> u32 {
        let mut le = [0u8; 4];
        le[..self.width].copy_from_slice(&bytes[self.offset..self.end()]);
        u32::from_le_bytes(le)
    }

    fn validate(&self, name: &str) -> CaptureResult<()> {
        if self.width == 0 || self.width > 4 {
            return Err(CaptureError::Configuration(format!(
                "metadata field '{}' width must be 1-4 bytes, got {}",
                name, self.width
            )));
        }
        Ok(())
    }
}

/// Byte layout of the counters embedded in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataLayout {
    /// Device-reported frame counter.
    pub frame_counter: CounterField,
    /// Device clock tick counter.
    pub device_time: CounterField,
    /// Tag that changes once per unique frame.
    pub frame_tag: CounterField,
}

impl Default for MetadataLayout {
    fn default() -> Self {
        Self {
            frame_counter: CounterField::new(0, 3),
            device_time: CounterField::new(4, 4),
            frame_tag: CounterField::new(10, 4),
        }
    }
}

impl MetadataLayout {
    /// Minimum payload length that holds every field (14 for the default layout).
    #[must_use]
    pub fn required_bytes(&self) -> usize {
        self.frame_counter
            .end()
            .max(self.device_time.end())
            .max(self.frame_tag.end())
    }

    /// Check field widths and that the fields fit in a frame of `frame_bytes`.
    pub fn validate(&self, frame_bytes: usize) -> CaptureResult<()> {
        self.frame_counter.validate("frame_counter")?;
        self.device_time.validate("device_time")?;
        self.frame_tag.validate("frame_tag")?;

        let required = self.required_bytes();
        if frame_bytes < required {
            return Err(CaptureError::Configuration(format!(
                "frame of {} bytes cannot hold embedded metadata ({} bytes required)",
                frame_bytes, required
            )));
        }
        Ok(())
    }

    /// Read all three counters from `bytes`.
    #[must_use]
    pub fn read(&self, bytes: &[u8]) -> FrameMetadata {
        FrameMetadata {
            frame_counter: self.frame_counter.read(bytes),
            device_time_ticks: self.device_time.read(bytes),
            frame_tag: self.frame_tag.read(bytes),
        }
    }
}

/// Device clock that drives the embedded time counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClock {
    /// Tick frequency in Hz.
    pub hz: u64,
}

impl Default for DeviceClock {
    fn default() -> Self {
        Self { hz: 25_000_000 }
    }
}

impl DeviceClock {
    /// Convert a tick count to whole milliseconds.
    #[must_use]
    pub fn ticks_to_millis(&self, ticks: u32) -> u64 {
        u64::from(ticks) * 1000 / self.hz.max(1)
    }
}

/// Counters decoded from one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Device frame counter.
    pub frame_counter: u32,
    /// Device clock ticks at capture.
    pub device_time_ticks: u32,
    /// Calculated-frame tag.
    pub frame_tag: u32,
}

/// A decoded frame: row-major 8-bit pixel grid plus its metadata.
///
/// Allocated once per session and overwritten every cycle.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    /// Counters decoded from the payload.
    pub metadata: FrameMetadata,
}

impl DecodedFrame {
    /// Allocate a zeroed frame of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; width as usize * height as usize],
            metadata: FrameMetadata::default(),
        }
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whole pixel grid, row-major.
    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// One row of the grid.
    #[inline]
    #[must_use]
    pub fn row(&self, y: u32) -> &[u8] {
        let w = self.width as usize;
        let start = y as usize * w;
        &self.pixels[start..start + w]
    }

    /// Pixel at column `x`, row `y`.
    #[inline]
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }
}

/// Copies payloads into the pixel grid and reads the embedded counters.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    geometry: FrameGeometry,
    layout: MetadataLayout,
    frame_bytes: usize,
}

impl FrameDecoder {
    /// Build a decoder, validating geometry and layout.
    pub fn new(geometry: FrameGeometry, layout: MetadataLayout) -> CaptureResult<Self> {
        let size = validate_frame_size(geometry.width, geometry.height, 1)?;
        layout.validate(size.bytes)?;
        Ok(Self {
            geometry,
            layout,
            frame_bytes: size.bytes,
        })
    }

    /// Bytes consumed from each payload.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Metadata layout in use.
    #[must_use]
    pub fn layout(&self) -> &MetadataLayout {
        &self.layout
    }

    /// Allocate a frame matching this decoder's geometry.
    #[must_use]
    pub fn allocate_frame(&self) -> DecodedFrame {
        DecodedFrame::new(self.geometry.width, self.geometry.height)
    }

    /// Decode `payload` into `frame`, reusing its pixel storage.
    ///
    /// Bytes beyond one frame (row padding, trailing pool space) are ignored.
    pub fn decode_into(&self, payload: &[u8], frame: &mut DecodedFrame) -> CaptureResult<FrameMetadata> {
        if payload.len() < self.frame_bytes {
            return Err(CaptureError::ShortBuffer {
                expected: self.frame_bytes,
                actual: payload.len(),
            });
        }
        frame.pixels.copy_from_slice(&payload[..self.frame_bytes]);
        frame.metadata = self.layout.read(&frame.pixels);
        Ok(frame.metadata)
    }
}
