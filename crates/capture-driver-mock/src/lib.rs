//! Mock Frame Source and Recording Sink for rust-capture
//!
//! This crate simulates an interrupt-driven frame grabber so the acquisition
//! pipeline can be exercised without hardware.
//!
//! # Available Mocks
//!
//! - [`MockFrameSourceDriver`] / [`MockFrameSource`] - Ring-buffer grabber with a
//!   manual or free-running producer, FIFO overflow and fault injection
//! - [`MockRecordingSink`] - Counting sink that keeps no pixel data
//!
//! # Frame Content
//!
//! Frames are 8-bit gray with a dim noisy gradient, a blinking indicator LED at the
//! default ROI and the frame counter, device clock and frame tag stamped into the
//! first 14 bytes (see [`pattern`]).
//!
//! ```rust,no_run
//! use capture_core::{run_session, AcquisitionContext, CaptureConfig, NullSink};
//! use capture_driver_mock::MockFrameSourceDriver;
//!
//! let driver = MockFrameSourceDriver::free_running();
//! let report = run_session(&CaptureConfig::default(), &driver, NullSink, AcquisitionContext::new())?;
//! println!("{}", report);
//! # Ok::<(), capture_core::CaptureError>(())
//! ```

pub mod common;
mod mock_sink;
mod mock_source;
pub mod pattern;

pub use common::{FaultConfig, FaultScenario, FrameTiming, MockRng, ProducerMode};
pub use mock_sink::{MockRecordingSink, OpenedRecording, SinkRecord};
pub use mock_source::{
    MockFrameSource, MockFrameSourceDriver, MockProducer, MockSourceConfig, SourceProbe, SOURCE_TYPE,
};
pub use pattern::LedPattern;
