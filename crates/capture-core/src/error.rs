//! Error types for the capture pipeline.
//!
//! This module defines the primary error type, `CaptureError`, together with the
//! two collaborator error types that cross the core's boundary:
//!
//! - **`SourceError`**: raised by a Frame Source. Carries a [`SourceErrorKind`] so the
//!   acquisition loop can tell a recoverable "no data ready" apart from a fatal
//!   hardware or communication failure.
//! - **`SinkError`**: raised by a Recording Sink.
//!
//! ## Error Categories
//!
//! 1. **Configuration** - `Config`, `Configuration`. Detected before the session
//!    starts; the session never enters the acquisition loop.
//! 2. **Fatal session** - `Source` (setup, release, non-recoverable fetch). Setup
//!    failures are returned as errors; failures inside the loop, like a FIFO
//!    overflow, end the session through the orderly stop path and are reported as a
//!    fatal `StopReason`.
//! 3. **Recoverable** - `ShortBuffer` and `SourceErrorKind::NoData`. Absorbed by the
//!    loop and reflected only in the session counters.

use thiserror::Error;

// =============================================================================
// Source Errors
// =============================================================================

/// Category of a Frame Source failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// No completed buffer was available for a non-blocking fetch.
    NoData,
    /// The source rejected its configuration (board, channel, pool size).
    Configuration,
    /// Register or bus I/O with the device failed.
    Communication,
    /// The device reported a hardware fault.
    Hardware,
    /// The session has already been aborted.
    Shutdown,
}

impl std::fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SourceErrorKind::NoData => "no_data",
            SourceErrorKind::Configuration => "configuration",
            SourceErrorKind::Communication => "communication",
            SourceErrorKind::Hardware => "hardware",
            SourceErrorKind::Shutdown => "shutdown",
        };
        write!(f, "{}", label)
    }
}

/// Structured Frame Source error with category.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Frame source '{source_type}' {kind} error: {message}")]
pub struct SourceError {
    /// Name of the source implementation that failed.
    pub source_type: String,
    /// Failure category.
    pub kind: SourceErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl SourceError {
    /// Create a new source error.
    pub fn new(
        source_type: impl Into<String>,
        kind: SourceErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for the recoverable "nothing to fetch" condition.
    pub fn no_data(source_type: impl Into<String>) -> Self {
        Self::new(source_type, SourceErrorKind::NoData, "no buffer ready")
    }

    /// Whether the loop may skip this failure and keep acquiring.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.kind == SourceErrorKind::NoData
    }
}

// =============================================================================
// Sink Errors
// =============================================================================

/// Recording Sink failures.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink cannot encode the requested codec.
    #[error("Codec '{0}' is not supported by this sink")]
    UnsupportedCodec(String),

    /// `write_frame` or `close` was called before `open`.
    #[error("Recording sink is not open")]
    NotOpen,

    /// The frame handed to the sink does not match the geometry it was opened with.
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize {
        /// Bytes per frame given at `open`.
        expected: usize,
        /// Bytes actually passed.
        actual: usize,
    },

    /// Underlying file I/O failed.
    #[error("Recording I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Capture Errors
// =============================================================================

/// Convenience alias for results using the capture error type.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

/// Primary error type for the capture pipeline.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Configuration file or environment parsing failed.
    ///
    /// **Error Type**: Permanent - requires fixing the configuration file.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration values parsed but failed semantic validation
    /// (ROI outside the frame, zero-sized pool, frame too small for the metadata).
    ///
    /// **Recovery Strategy**: Abort before the acquisition loop starts.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Frame dimensions exceed the supported maximum.
    #[error("Frame dimensions {width}x{height} exceed maximum {max_dimension}")]
    FrameDimensionsTooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Largest supported side.
        max_dimension: u32,
    },

    /// Frame payload would exceed the per-frame byte limit.
    #[error("Frame size {bytes} bytes exceeds maximum {max_bytes} bytes")]
    FrameTooLarge {
        /// Requested bytes per frame.
        bytes: usize,
        /// Limit.
        max_bytes: usize,
    },

    /// Arithmetic overflow while sizing a buffer.
    #[error("Size overflow while computing {context}")]
    SizeOverflow {
        /// What was being computed.
        context: &'static str,
    },

    /// A fetched payload was shorter than one frame.
    ///
    /// **Error Type**: Recoverable - the frame is skipped and its buffer released.
    #[error("Short frame buffer: expected {expected} bytes, got {actual}")]
    ShortBuffer {
        /// Bytes in one frame.
        expected: usize,
        /// Bytes delivered by the source.
        actual: usize,
    },

    /// Frame Source failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Recording Sink failure.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Session log serialization failed.
    #[error("Session log error: {0}")]
    Csv(#[from] csv::Error),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
