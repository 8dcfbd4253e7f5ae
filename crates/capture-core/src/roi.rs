//! Region-of-interest threshold classifier.
//!
//! Averages the pixel intensity over a fixed rectangle of every decoded frame and
//! reports a binary state (for example an indicator LED being on). The rectangle is
//! fixed for the whole session and checked against the frame bounds before the
//! acquisition loop starts.

use crate::decoder::DecodedFrame;
use crate::error::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};

/// Rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiRect {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl RoiRect {
    /// Number of pixels covered.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// ROI classifier configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiSettings {
    /// Rectangle to average.
    pub rect: RoiRect,
    /// Mean intensity above which the state is `true` (8-bit scale).
    pub threshold: f64,
}

impl Default for RoiSettings {
    fn default() -> Self {
        // 25x25 patch around the indicator LED
        Self {
            rect: RoiRect {
                x: 32,
                y: 132,
                width: 25,
                height: 25,
            },
            threshold: 200.0,
        }
    }
}

/// Result of classifying one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RoiResult {
    /// Arithmetic mean over the rectangle.
    pub mean_intensity: f64,
    /// `mean_intensity > threshold`.
    pub state: bool,
}

/// Classifier bound to a validated rectangle.
#[derive(Debug, Clone, Copy)]
pub struct RoiClassifier {
    rect: RoiRect,
    threshold: f64,
}

impl RoiClassifier {
    /// Validate `settings` against a `frame_width`x`frame_height` frame.
    pub fn new(settings: &RoiSettings, frame_width: u32, frame_height: u32) -> CaptureResult<Self> {
        let rect = settings.rect;
        if rect.width == 0 || rect.height == 0 {
            return Err(CaptureError::Configuration(format!(
                "ROI must be non-empty, got {}x{}",
                rect.width, rect.height
            )));
        }

        let fits_x = rect.x.checked_add(rect.width).is_some_and(|end| end <= frame_width);
        let fits_y = rect.y.checked_add(rect.height).is_some_and(|end| end <= frame_height);
        if !fits_x || !fits_y {
            return Err(CaptureError::Configuration(format!(
                "ROI {}x{} at ({}, {}) lies outside the {}x{} frame",
                rect.width, rect.height, rect.x, rect.y, frame_width, frame_height
            )));
        }

        if !settings.threshold.is_finite() {
            return Err(CaptureError::Configuration(
                "ROI threshold must be a finite number".into(),
            ));
        }

        Ok(Self {
            rect,
            threshold: settings.threshold,
        })
    }

    /// Rectangle being averaged.
    #[must_use]
    pub fn rect(&self) -> RoiRect {
        self.rect
    }

    /// Average the rectangle of `frame` and threshold it.
    #[must_use]
    pub fn classify(&self, frame: &DecodedFrame) -> RoiResult {
        let x0 = self.rect.x as usize;
        let x1 = x0 + self.rect.width as usize;

        let sum: u64 = (self.rect.y..self.rect.y + self.rect.height)
            .map(|y| {
                frame.row(y)[x0..x1]
                    .iter()
                    .map(|&p| u64::from(p))
                    .sum::<u64>()
            })
            .sum();

        let mean_intensity = sum as f64 / self.rect.area() as f64;
        RoiResult {
            mean_intensity,
            state: mean_intensity > self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameGeometry;
    use crate::decoder::{FrameDecoder, MetadataLayout};

    fn frame_from(width: u32, height: u32, pixels: &[u8]) -> DecodedFrame {
        let decoder =
            FrameDecoder::new(FrameGeometry { width, height }, MetadataLayout::default()).unwrap();
        let mut frame = decoder.allocate_frame();
        decoder.decode_into(pixels, &mut frame).unwrap();
        frame
    }

    fn settings(x: u32, y: u32, width: u32, height: u32) -> RoiSettings {
        RoiSettings {
            rect: RoiRect { x, y, width, height },
            threshold: 200.0,
        }
    }

    #[test]
    fn test_all_zero_region() {
        let frame = frame_from(8, 8, &[0u8; 64]);
        let roi = RoiClassifier::new(&settings(2, 2, 4, 4), 8, 8).unwrap();

        let result = roi.classify(&frame);
        assert_eq!(result.mean_intensity, 0.0);
        assert!(!result.state);
    }

    #[test]
    fn test_all_saturated_region() {
        let frame = frame_from(8, 8, &[255u8; 64]);
        let roi = RoiClassifier::new(&settings(2, 2, 4, 4), 8, 8).unwrap();

        let result = roi.classify(&frame);
        assert_eq!(result.mean_intensity, 255.0);
        assert!(result.state);
    }

    #[test]
    fn test_straddling_region_is_exact_mean() {
        // Left half of the ROI at 190, right half at 215: mean 202.5
        let mut pixels = [0u8; 64];
        for y in 0..8 {
            for x in 0..8 {
                pixels[y * 8 + x] = if x < 4 { 190 } else { 215 };
            }
        }
        let frame = frame_from(8, 8, &pixels);
        let roi = RoiClassifier::new(&settings(2, 4, 4, 2), 8, 8).unwrap();

        let result = roi.classify(&frame);
        assert_eq!(result.mean_intensity, 202.5);
        assert!(result.state);
    }

    #[test]
    fn test_threshold_is_strict() {
        let frame = frame_from(8, 8, &[200u8; 64]);
        let roi = RoiClassifier::new(&settings(0, 0, 8, 8), 8, 8).unwrap();
        assert!(!roi.classify(&frame).state);
    }

    #[test]
    fn test_rect_must_fit_frame() {
        assert!(RoiClassifier::new(&settings(4, 4, 4, 4), 8, 8).is_ok());
        assert!(RoiClassifier::new(&settings(5, 4, 4, 4), 8, 8).is_err());
        assert!(RoiClassifier::new(&settings(0, 8, 1, 1), 8, 8).is_err());
        assert!(RoiClassifier::new(&settings(u32::MAX, 0, 2, 1), 8, 8).is_err());
    }

    #[test]
    fn test_empty_rect_rejected() {
        assert!(RoiClassifier::new(&settings(0, 0, 0, 4), 8, 8).is_err());
    }

    #[test]
    fn test_default_rect_fits_default_frame() {
        assert!(RoiClassifier::new(&RoiSettings::default(), 1024, 1024).is_ok());
    }
}
