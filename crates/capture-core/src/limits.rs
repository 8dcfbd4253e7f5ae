//! Shared hard limits and timing constants.
//!
//! This module centralizes:
//! - The rate estimator window
//! - Default wait/poll intervals of the acquisition loop
//! - Frame size limits, so a bad configuration cannot trigger an unbounded allocation

use crate::error::CaptureError;
use std::time::Duration;

// =============================================================================
// Timing Constants
// =============================================================================

/// Window over which both frame-rate estimators accumulate (1 second).
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Default upper bound on how long the loop sleeps before re-checking its
/// deadline and stop request.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// =============================================================================
// Size Limits
// =============================================================================

/// Maximum allowed frame payload in bytes (64 MB).
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;
/// Maximum supported width/height for frames.
pub const MAX_FRAME_DIMENSION: u32 = 16_384;
/// Maximum number of acquisition buffers a source may be asked to allocate.
pub const MAX_POOL_BUFFERS: usize = 1024;

/// Validated frame sizing information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    /// Pixels per frame.
    pub pixels: usize,
    /// Bytes per frame.
    pub bytes: usize,
}

/// Validate frame dimensions and calculate pixel/byte sizes safely.
pub fn validate_frame_size(
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Result<FrameSize, CaptureError> {
    if width == 0 || height == 0 {
        return Err(CaptureError::Configuration(format!(
            "frame dimensions must be non-zero, got {}x{}",
            width, height
        )));
    }

    if width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return Err(CaptureError::FrameDimensionsTooLarge {
            width,
            height,
            max_dimension: MAX_FRAME_DIMENSION,
        });
    }

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or(CaptureError::SizeOverflow {
            context: "frame pixel count",
        })?;

    let bytes = pixels
        .checked_mul(bytes_per_pixel)
        .ok_or(CaptureError::SizeOverflow {
            context: "frame byte size",
        })?;

    if bytes > MAX_FRAME_BYTES {
        return Err(CaptureError::FrameTooLarge {
            bytes,
            max_bytes: MAX_FRAME_BYTES,
        });
    }

    Ok(FrameSize { pixels, bytes })
}
