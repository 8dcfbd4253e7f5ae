//! Session configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, every key optional)
//! 2. environment variables prefixed with `RUST_CAPTURE_`, nested keys split on `__`
//!
//! Every section falls back to the defaults of the reference rig (1024x1024 sensor at
//! 949 fps, 410 s sessions, indicator LED at (32, 132)).
//!
//! # Example
//! ```no_run
//! use capture_core::config::CaptureConfig;
//!
//! let config = CaptureConfig::load_from("config/capture.toml")?;
//! config.validate()?;
//! println!("Session length: {:?}", config.acquisition.duration);
//! # Ok::<(), capture_core::error::CaptureError>(())
//! ```
//!
//! Environment override example: `RUST_CAPTURE_ACQUISITION__DURATION="30s"`.

use crate::decoder::{DeviceClock, FrameDecoder, MetadataLayout};
use crate::error::{CaptureError, CaptureResult};
use crate::limits::{DEFAULT_POLL_INTERVAL, MAX_POOL_BUFFERS};
use crate::roi::{RoiClassifier, RoiSettings};
use crate::sink::VideoCodec;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "RUST_CAPTURE_";

/// Upper bound on rows preallocated for the session log.
const MAX_PREALLOCATED_ROWS: usize = 1 << 20;

/// Top-level session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Deadline, polling and stop conditions
    pub acquisition: AcquisitionSettings,
    /// Sensor geometry
    pub frame: FrameGeometry,
    /// Embedded counter layout and device clock
    pub metadata: MetadataSettings,
    /// Indicator region
    pub roi: RoiSettings,
    /// Settings handed to the Frame Source
    pub source: SourceSettings,
    /// Recording Sink output
    pub recording: RecordingSettings,
    /// Session log output
    pub session_log: SessionLogSettings,
}

/// Acquisition loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Wall-clock budget for the whole session
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Maximum time spent waiting for a notification before re-checking the deadline
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Stop after this many decoded frames
    pub frame_limit: Option<u64>,
    /// Rows to preallocate for the session log (derived from duration and camera rate if unset)
    pub log_capacity: Option<usize>,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(410),
            poll_interval: DEFAULT_POLL_INTERVAL,
            frame_limit: None,
            log_capacity: None,
        }
    }
}

/// Frame dimensions in pixels (8 bits per pixel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    /// Pixels per row
    pub width: u32,
    /// Rows per frame
    pub height: u32,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
        }
    }
}

/// Where the counters live and how fast the device clock ticks
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    /// Byte layout of the embedded counters
    pub layout: MetadataLayout,
    /// Device timestamp clock
    pub clock: DeviceClock,
}

/// A single device register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWrite {
    /// Register address
    pub address: u32,
    /// Value to write
    pub value: u32,
}

/// Frame Source settings, passed through to the driver at session acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Board number (auto-detect when unset)
    pub board: Option<u32>,
    /// Channel on the board (auto-detect when unset)
    pub channel: Option<u32>,
    /// Device configuration file
    pub config_file: Option<PathBuf>,
    /// Capture buffers in the source's pool
    pub buffer_count: usize,
    /// Camera frame rate
    pub camera_fps: u32,
    /// Exposure time in microseconds
    pub exposure_us: u32,
    /// Stamp the frame counter into the first pixels
    pub frame_counter_stamp: bool,
    /// Stamp the device timestamp into the first pixels
    pub timestamp_stamp: bool,
    /// Register write that starts camera acquisition
    pub acq_start: Option<RegisterWrite>,
    /// Register write that stops camera acquisition
    pub acq_stop: Option<RegisterWrite>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            board: None,
            channel: None,
            config_file: None,
            buffer_count: 20,
            camera_fps: 949,
            exposure_us: 1052,
            frame_counter_stamp: true,
            timestamp_stamp: true,
            acq_start: None,
            acq_stop: None,
        }
    }
}

/// Recording Sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Forward frames to the sink. Raw 1024x1024 frames at 949 fps fill about
    /// 1 GB/s, so recording is opt-in.
    pub enabled: bool,
    /// Directory for the video file
    pub output_dir: PathBuf,
    /// Playback rate written into the recording
    pub fps: u32,
    /// Requested codec
    pub codec: VideoCodec,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: PathBuf::from("data/video"),
            fps: 182,
            codec: VideoCodec::Raw,
        }
    }
}

/// Session log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLogSettings {
    /// Directory for the CSV file
    pub output_dir: PathBuf,
}

impl Default for SessionLogSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/logs"),
        }
    }
}

impl CaptureConfig {
    /// Load configuration from `path` merged with `RUST_CAPTURE_*` environment variables.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> CaptureResult<Self> {
        Self::from_figment(Self::figment(path))
    }

    /// Provider stack used by [`CaptureConfig::load_from`].
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract a configuration from any provider stack.
    pub fn from_figment(figment: Figment) -> CaptureResult<Self> {
        Ok(figment.extract()?)
    }

    /// Validate configuration after loading.
    ///
    /// Every check that would otherwise fail inside the acquisition loop runs here.
    pub fn validate(&self) -> CaptureResult<()> {
        // Geometry limits and metadata layout
        FrameDecoder::new(self.frame, self.metadata.layout)?;

        RoiClassifier::new(&self.roi, self.frame.width, self.frame.height)?;

        if self.source.buffer_count == 0 {
            return Err(CaptureError::Configuration(
                "source.buffer_count must be at least 1".into(),
            ));
        }
        if self.source.buffer_count > MAX_POOL_BUFFERS {
            return Err(CaptureError::Configuration(format!(
                "source.buffer_count {} exceeds maximum {}",
                self.source.buffer_count, MAX_POOL_BUFFERS
            )));
        }
        if self.source.camera_fps == 0 {
            return Err(CaptureError::Configuration(
                "source.camera_fps must be positive".into(),
            ));
        }

        if self.metadata.clock.hz == 0 {
            return Err(CaptureError::Configuration(
                "metadata.clock.hz must be positive".into(),
            ));
        }

        if self.acquisition.duration.is_zero() {
            return Err(CaptureError::Configuration(
                "acquisition.duration must be positive".into(),
            ));
        }
        if self.acquisition.poll_interval.is_zero() {
            return Err(CaptureError::Configuration(
                "acquisition.poll_interval must be positive".into(),
            ));
        }
        if self.acquisition.frame_limit == Some(0) {
            return Err(CaptureError::Configuration(
                "acquisition.frame_limit must be positive when set".into(),
            ));
        }

        if self.recording.enabled && self.recording.fps == 0 {
            return Err(CaptureError::Configuration(
                "recording.fps must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Rows to preallocate for the session log.
    #[must_use]
    pub fn log_capacity(&self) -> usize {
        if let Some(capacity) = self.acquisition.log_capacity {
            return capacity;
        }
        let expected = self
            .acquisition
            .duration
            .as_secs()
            .saturating_add(1)
            .saturating_mul(u64::from(self.source.camera_fps));
        let expected = match self.acquisition.frame_limit {
            Some(limit) => expected.min(limit),
            None => expected,
        };
        usize::try_from(expected)
            .unwrap_or(MAX_PREALLOCATED_ROWS)
            .min(MAX_PREALLOCATED_ROWS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::RoiRect;
    use figment::providers::Serialized;

    #[test]
    fn test_defaults_are_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acquisition.duration, Duration::from_secs(410));
        assert_eq!(config.frame, FrameGeometry { width: 1024, height: 1024 });
        assert_eq!(config.source.buffer_count, 20);
        assert_eq!(config.source.camera_fps, 949);
        assert_eq!(config.recording.fps, 182);
        assert!(!config.recording.enabled, "recording is opt-in");
        assert_eq!(config.roi.threshold, 200.0);
        assert_eq!(config.metadata.clock.hz, 25_000_000);
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.toml");
        std::fs::write(
            &path,
            r#"
[acquisition]
duration = "30s"
poll_interval = "5ms"
frame_limit = 1000

[frame]
width = 256
height = 200

[roi]
rect = { x = 10, y = 20, width = 8, height = 8 }

[source]
buffer_count = 4
acq_start = { address = 0x601C, value = 1 }

[recording]
enabled = true
"#,
        )
        .unwrap();

        let config = CaptureConfig::from_figment(
            Figment::new().merge(Toml::file(&path)),
        )
        .unwrap();

        assert_eq!(config.acquisition.duration, Duration::from_secs(30));
        assert_eq!(config.acquisition.poll_interval, Duration::from_millis(5));
        assert_eq!(config.acquisition.frame_limit, Some(1000));
        assert_eq!(config.frame, FrameGeometry { width: 256, height: 200 });
        assert_eq!(config.roi.rect, RoiRect { x: 10, y: 20, width: 8, height: 8 });
        assert_eq!(config.roi.threshold, 200.0, "unset keys keep defaults");
        assert_eq!(config.source.buffer_count, 4);
        assert_eq!(
            config.source.acq_start,
            Some(RegisterWrite { address: 0x601C, value: 1 })
        );
        assert_eq!(config.source.camera_fps, 949);
        assert!(config.recording.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig::from_figment(
            Figment::new().merge(Toml::file(dir.path().join("absent.toml"))),
        )
        .unwrap();
        assert_eq!(config.source.buffer_count, 20);
    }

    #[test]
    fn test_bad_duration_is_parse_error() {
        let result = CaptureConfig::from_figment(
            Figment::new().merge(Serialized::default("acquisition.duration", "forever")),
        );
        assert!(matches!(result, Err(CaptureError::Config(_))));
    }

    #[test]
    fn test_zero_pool_rejected() {
        let mut config = CaptureConfig::default();
        config.source.buffer_count = 0;
        assert!(matches!(config.validate(), Err(CaptureError::Configuration(_))));
    }

    #[test]
    fn test_oversized_pool_rejected() {
        let mut config = CaptureConfig::default();
        config.source.buffer_count = MAX_POOL_BUFFERS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roi_outside_frame_rejected() {
        let mut config = CaptureConfig::default();
        config.frame = FrameGeometry { width: 64, height: 64 };
        // default ROI starts at row 132
        assert!(matches!(config.validate(), Err(CaptureError::Configuration(_))));
    }

    #[test]
    fn test_frame_too_small_for_metadata_rejected() {
        let mut config = CaptureConfig::default();
        config.frame = FrameGeometry { width: 13, height: 1 };
        config.roi.rect = RoiRect { x: 0, y: 0, width: 1, height: 1 };
        assert!(config.validate().is_err());

        config.frame.width = 14;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_counter_width_rejected() {
        let mut config = CaptureConfig::default();
        config.metadata.layout.frame_tag = crate::decoder::CounterField::new(10, 5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_frame_limit_rejected() {
        let mut config = CaptureConfig::default();
        config.acquisition.frame_limit = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_capacity_derivation() {
        let mut config = CaptureConfig::default();
        config.acquisition.duration = Duration::from_secs(9);
        config.source.camera_fps = 100;
        assert_eq!(config.log_capacity(), 1000);

        config.acquisition.frame_limit = Some(50);
        assert_eq!(config.log_capacity(), 50);

        config.acquisition.log_capacity = Some(7);
        assert_eq!(config.log_capacity(), 7);

        config.acquisition.log_capacity = None;
        config.acquisition.frame_limit = None;
        config.acquisition.duration = Duration::from_secs(1_000_000);
        assert_eq!(config.log_capacity(), MAX_PREALLOCATED_ROWS);
    }
}
