//! Session wiring: validate, acquire the source, register the callback, run.

use crate::acquisition::{AcquisitionLoop, SessionReport};
use crate::config::CaptureConfig;
use crate::error::CaptureResult;
use crate::signal::{AcquisitionContext, BufferReadySignal};
use crate::sink::RecordingSink;
use crate::source::{FrameSource, FrameSourceDriver};
use std::sync::Arc;

/// Run one complete capture session.
///
/// Configuration errors and source setup failures are returned before the loop
/// starts. `context` must be fresh; keep a [`StopHandle`](crate::signal::StopHandle)
/// on it to stop the session from another thread.
pub fn run_session<D, K>(
    config: &CaptureConfig,
    driver: &D,
    sink: K,
    context: Arc<AcquisitionContext>,
) -> CaptureResult<SessionReport>
where
    D: FrameSourceDriver,
    K: RecordingSink,
{
    config.validate()?;

    let mut source = driver.acquire_session(&config.source, config.frame)?;
    tracing::info!(
        source = source.name(),
        buffers = config.source.buffer_count,
        camera_fps = config.source.camera_fps,
        "Frame source acquired"
    );

    if let Err(e) = source.register_callback(BufferReadySignal::new(Arc::clone(&context))) {
        if let Err(abort_err) = source.abort() {
            tracing::warn!(source = source.name(), error = %abort_err, "Frame source abort failed");
        }
        return Err(e.into());
    }

    let mut acquisition = AcquisitionLoop::new(config, source, sink, context)?;
    acquisition.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FrameGeometry, SourceSettings};
    use crate::error::{CaptureError, SourceError, SourceErrorKind};
    use crate::sink::NullSink;
    use crate::source::RawBuffer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    /// Source whose callback registration and abort both fail.
    struct UnresponsiveSource {
        aborts: Arc<AtomicUsize>,
    }

    fn refused(op: &str) -> SourceError {
        SourceError::new("unresponsive", SourceErrorKind::Communication, format!("{} refused", op))
    }

    impl FrameSource for UnresponsiveSource {
        fn name(&self) -> &str {
            "unresponsive"
        }

        fn register_callback(&mut self, _signal: BufferReadySignal) -> Result<(), SourceError> {
            Err(refused("register"))
        }

        fn start(&mut self) -> Result<(), SourceError> {
            Err(refused("start"))
        }

        fn fetch_latest_buffer(&mut self) -> Result<RawBuffer<'_>, SourceError> {
            Err(refused("fetch"))
        }

        fn release_buffer(&mut self) -> Result<(), SourceError> {
            Ok(())
        }

        fn abort(&mut self) -> Result<(), SourceError> {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            Err(refused("abort"))
        }
    }

    struct UnresponsiveDriver {
        aborts: Arc<AtomicUsize>,
    }

    impl FrameSourceDriver for UnresponsiveDriver {
        type Session = UnresponsiveSource;

        fn acquire_session(
            &self,
            _settings: &SourceSettings,
            _geometry: FrameGeometry,
        ) -> Result<UnresponsiveSource, SourceError> {
            Ok(UnresponsiveSource {
                aborts: Arc::clone(&self.aborts),
            })
        }
    }

    #[test]
    #[traced_test]
    fn test_register_failure_aborts_and_logs_abort_error() {
        let driver = UnresponsiveDriver {
            aborts: Arc::new(AtomicUsize::new(0)),
        };
        let result = run_session(
            &CaptureConfig::default(),
            &driver,
            NullSink,
            AcquisitionContext::new(),
        );

        assert!(matches!(result, Err(CaptureError::Source(ref e)) if e.message.contains("register")));
        assert_eq!(driver.aborts.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Frame source abort failed"));
        assert!(logs_contain("abort refused"));
    }
}
