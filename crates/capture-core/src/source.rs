//! Frame Source interface.
//!
//! A Frame Source is the external producer: a frame grabber that writes fixed-size
//! capture buffers into its own pool and raises notifications as they complete.
//! The core only relies on the operations below.
//!
//! # Lifecycle
//!
//! ```text
//! driver.acquire_session(settings, geometry)   -> session
//! session.register_callback(signal)
//! session.start()
//! loop {
//!     session.fetch_latest_buffer()   (non-blocking, may fail with NoData)
//!     session.release_buffer()        (exactly once per successful fetch)
//! }
//! session.abort()
//! ```

use crate::config::{FrameGeometry, SourceSettings};
use crate::error::SourceError;
use crate::signal::BufferReadySignal;

/// Opaque handle back to the source's pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub usize);

/// A completed capture buffer borrowed for one fetch-release cycle.
#[derive(Debug)]
pub struct RawBuffer<'a> {
    data: &'a [u8],
    handle: BufferHandle,
}

impl<'a> RawBuffer<'a> {
    /// Wrap a borrowed payload.
    #[must_use]
    pub fn new(data: &'a [u8], handle: BufferHandle) -> Self {
        Self { data, handle }
    }

    /// Raw payload bytes.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Pool slot this payload lives in.
    #[must_use]
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }
}

/// Opens capture sessions on a device.
pub trait FrameSourceDriver {
    /// Session type produced by this driver.
    type Session: FrameSource;

    /// Open `settings.board`/`settings.channel`, allocate the buffer pool and
    /// apply the device configuration. Failure is fatal for the session.
    fn acquire_session(
        &self,
        settings: &SourceSettings,
        geometry: FrameGeometry,
    ) -> Result<Self::Session, SourceError>;
}

/// An open capture session.
pub trait FrameSource: Send {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Register the notification target. Called once, before `start`.
    fn register_callback(&mut self, signal: BufferReadySignal) -> Result<(), SourceError>;

    /// Begin streaming into the pool.
    fn start(&mut self) -> Result<(), SourceError>;

    /// Borrow the oldest unreleased completed buffer, which after staleness
    /// resolution is the most recent one. Never blocks.
    fn fetch_latest_buffer(&mut self) -> Result<RawBuffer<'_>, SourceError>;

    /// Return the oldest unreleased buffer to the pool. A release with nothing
    /// held is a no-op.
    fn release_buffer(&mut self) -> Result<(), SourceError>;

    /// Stop acquisition and the device. Best effort at session end.
    fn abort(&mut self) -> Result<(), SourceError>;
}
