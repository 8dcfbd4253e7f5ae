//! `capture-core`
//!
//! Real-time frame acquisition pipeline for interrupt-driven frame grabbers.
//!
//! A Frame Source writes fixed-size buffers into its own pool and reports each
//! completion through a [`BufferReadySignal`](signal::BufferReadySignal). A single
//! consumer, the [`AcquisitionLoop`](acquisition::AcquisitionLoop), wakes on those
//! notifications, drops every stale buffer but the newest, decodes the counters the
//! camera stamps into the first pixels, keeps two frame-rate estimates, classifies a
//! region of interest and forwards the frame to a [`RecordingSink`](sink::RecordingSink).
//!
//! ## Data Flow
//!
//! ```text
//! FrameSource ─► BufferReadySignal ─► AcquisitionLoop ─┬─► StalenessResolver
//!                                                      ├─► FrameDecoder ─┬─► RateEstimators
//!                                                      │                 └─► RoiClassifier
//!                                                      ├─► RecordingSink
//!                                                      └─► SessionLog (flushed at stop)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use capture_core::config::CaptureConfig;
//! use capture_core::session::run_session;
//! use capture_core::signal::{AcquisitionContext, StopHandle};
//! use capture_core::sink::NullSink;
//! # fn example<D: capture_core::source::FrameSourceDriver>(driver: D) -> capture_core::CaptureResult<()> {
//! let config = CaptureConfig::load_from("config/capture.toml")?;
//! let context = AcquisitionContext::new();
//! let _stop = StopHandle::new(context.clone());
//! let report = run_session(&config, &driver, NullSink, context)?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod config;
pub mod decoder;
pub mod error;
pub mod limits;
pub mod rate;
pub mod roi;
pub mod session;
pub mod session_log;
pub mod signal;
pub mod sink;
pub mod source;
pub mod staleness;

pub use acquisition::{AcquisitionLoop, AcquisitionState, SessionReport, SessionStats, StopReason};
pub use config::CaptureConfig;
pub use error::{CaptureError, CaptureResult, SinkError, SourceError, SourceErrorKind};
pub use session::run_session;
pub use signal::{AcquisitionContext, BufferReadySignal, EventMask, StopHandle};
pub use sink::{NullSink, RawVideoSink, RecordingSink, VideoCodec};
pub use source::{BufferHandle, FrameSource, FrameSourceDriver, RawBuffer};
