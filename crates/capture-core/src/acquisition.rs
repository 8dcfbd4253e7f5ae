//! Acquisition loop and its termination state machine.
//!
//! One iteration consumes at most one frame:
//!
//! ```text
//! WaitingForReady ─► ResolvingStale ─► Fetching ─► Decoding ─► ClassifyingAndRating
//!        ▲                                                            │
//!        └──────────────── Releasing ◄──────── Forwarding ◄───────────┘
//!
//! WaitingForReady ─(deadline | stop | overflow)─► Stopped
//! ResolvingStale  ─(release failure)────────────► Stopped
//! Fetching        ─(fatal fetch error)──────────► Stopped
//! Releasing       ─(release failure | limit)────► Stopped
//! ```
//!
//! Stop conditions are only evaluated in `WaitingForReady`, so an iteration that has
//! fetched a buffer always runs to `Releasing`. The loop runs on a dedicated thread
//! (the binary uses `spawn_blocking`) and never allocates per frame: the decoded frame
//! and the session log are sized up front.

use crate::config::CaptureConfig;
use crate::decoder::{DecodedFrame, FrameDecoder};
use crate::error::CaptureResult;
use crate::rate::{RateEstimators, Rates};
use crate::roi::RoiClassifier;
use crate::session_log::{session_file_path, session_stamp, LogRow, SessionLog};
use crate::signal::AcquisitionContext;
use crate::sink::RecordingSink;
use crate::source::FrameSource;
use crate::staleness::{discard_stale, StalenessResolver};
use chrono::Local;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Not yet started.
    Idle,
    /// Blocked on the context's wake primitive.
    WaitingForReady,
    /// Computing pending buffers and releasing stale ones.
    ResolvingStale,
    /// Borrowing the newest buffer from the source.
    Fetching,
    /// Copying pixels and reading embedded counters.
    Decoding,
    /// Updating rate windows and the ROI state.
    ClassifyingAndRating,
    /// Handing the frame to the recording sink.
    Forwarding,
    /// Returning the buffer to the source.
    Releasing,
    /// Terminal.
    Stopped,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The wall-clock budget ran out.
    DeadlineReached,
    /// An operator requested a stop.
    Aborted,
    /// The configured number of decoded frames was reached.
    FrameLimitReached,
    /// The source reported a FIFO overflow.
    FifoOverflow,
    /// The source failed in a way the loop cannot recover from.
    SourceFailure(String),
}

impl StopReason {
    /// True for stops caused by a failure rather than a normal end condition.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, StopReason::FifoOverflow | StopReason::SourceFailure(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::DeadlineReached => write!(f, "acquisition time elapsed"),
            StopReason::Aborted => write!(f, "stopped by operator"),
            StopReason::FrameLimitReached => write!(f, "frame limit reached"),
            StopReason::FifoOverflow => write!(f, "FIFO overflow"),
            StopReason::SourceFailure(msg) => write!(f, "source failure: {}", msg),
        }
    }
}

/// Counters accumulated over a session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames decoded and logged.
    pub decoded_frames: u64,
    /// Stale buffers released without decoding.
    pub discarded_buffers: u64,
    /// Fetches that returned no buffer.
    pub fetch_failures: u64,
    /// Fetched buffers that could not be decoded.
    pub decode_failures: u64,
    /// Frames the recording sink rejected.
    pub sink_errors: u64,
}

/// Summary returned once a session has stopped.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Why the loop stopped.
    pub stop_reason: StopReason,
    /// Session counters.
    pub stats: SessionStats,
    /// Rates as last reported.
    pub last_rates: Rates,
    /// Time from source start to stop.
    pub elapsed: Duration,
    /// Session log file.
    pub log_path: PathBuf,
    /// Recording file, if recording was enabled.
    pub recording_path: Option<PathBuf>,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session stopped: {}", self.stop_reason)?;
        writeln!(f, "  elapsed:          {:.3} s", self.elapsed.as_secs_f64())?;
        writeln!(f, "  decoded frames:   {}", self.stats.decoded_frames)?;
        writeln!(f, "  discarded stale:  {}", self.stats.discarded_buffers)?;
        writeln!(f, "  fetch failures:   {}", self.stats.fetch_failures)?;
        writeln!(f, "  decode failures:  {}", self.stats.decode_failures)?;
        writeln!(f, "  sink errors:      {}", self.stats.sink_errors)?;
        writeln!(
            f,
            "  last rates:       device {} fps, calculated {} fps",
            self.last_rates.device, self.last_rates.calculated
        )?;
        write!(f, "  session log:      {}", self.log_path.display())?;
        if let Some(path) = &self.recording_path {
            write!(f, "\n  recording:        {}", path.display())?;
        }
        Ok(())
    }
}

/// Single-consumer acquisition loop over one source session.
pub struct AcquisitionLoop<S, K> {
    config: CaptureConfig,
    source: S,
    sink: K,
    context: Arc<AcquisitionContext>,
    decoder: FrameDecoder,
    roi: RoiClassifier,
    frame: DecodedFrame,
    resolver: StalenessResolver,
    rates: RateEstimators,
    log: SessionLog,
    stats: SessionStats,
    state: AcquisitionState,
    recording: bool,
}

impl<S: FrameSource, K: RecordingSink> AcquisitionLoop<S, K> {
    /// Build a loop over an acquired source. Validates `config` and preallocates
    /// the frame and the session log.
    pub fn new(
        config: &CaptureConfig,
        source: S,
        sink: K,
        context: Arc<AcquisitionContext>,
    ) -> CaptureResult<Self> {
        config.validate()?;
        let decoder = FrameDecoder::new(config.frame, config.metadata.layout)?;
        let roi = RoiClassifier::new(&config.roi, config.frame.width, config.frame.height)?;
        let frame = decoder.allocate_frame();

        Ok(Self {
            config: config.clone(),
            source,
            sink,
            context,
            decoder,
            roi,
            frame,
            resolver: StalenessResolver::new(),
            rates: RateEstimators::new(Instant::now()),
            log: SessionLog::with_capacity(config.log_capacity()),
            stats: SessionStats::default(),
            state: AcquisitionState::Idle,
            recording: false,
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Rows logged so far.
    #[must_use]
    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// Give back the source and the sink.
    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    /// Run the session to completion.
    ///
    /// Setup failures (sink open, source start) return `Err` after best-effort
    /// cleanup. Once the loop is running, every stop, fatal or not, ends in
    /// `Ok(SessionReport)`; only a failure to write the session log is reported as
    /// an error at that point.
    pub fn run(&mut self) -> CaptureResult<SessionReport> {
        let stamp = session_stamp(Local::now());
        let log_path = session_file_path(&self.config.session_log.output_dir, &stamp, "csv");
        let recording_path = self.config.recording.enabled.then(|| {
            session_file_path(
                &self.config.recording.output_dir,
                &stamp,
                self.config.recording.codec.extension(),
            )
        });

        if let Some(path) = &recording_path {
            let geometry = self.config.frame;
            if let Err(e) = self.sink.open(
                path,
                geometry.width,
                geometry.height,
                self.config.recording.fps,
                self.config.recording.codec,
            ) {
                self.abort_source();
                self.state = AcquisitionState::Stopped;
                return Err(e.into());
            }
            self.recording = true;
        }

        if let Err(e) = self.source.start() {
            error!(source = self.source.name(), error = %e, "Failed to start frame source");
            self.close_sink();
            self.abort_source();
            self.state = AcquisitionState::Stopped;
            return Err(e.into());
        }

        let started = Instant::now();
        let deadline = started + self.config.acquisition.duration;
        self.rates = RateEstimators::new(started);
        info!(
            source = self.source.name(),
            duration = ?self.config.acquisition.duration,
            width = self.config.frame.width,
            height = self.config.frame.height,
            "Acquisition started"
        );

        let stop_reason = self.run_loop(deadline);
        self.state = AcquisitionState::Stopped;
        let elapsed = started.elapsed();

        match &stop_reason {
            StopReason::FifoOverflow => error!("FIFO overflow detected, aborting acquisition"),
            StopReason::SourceFailure(msg) => error!(error = %msg, "Acquisition aborted"),
            reason => info!(%reason, "Acquisition stopped"),
        }

        let flushed = self.log.flush_to(&log_path);
        self.close_sink();
        self.abort_source();
        flushed?;

        let report = SessionReport {
            stop_reason,
            stats: self.stats,
            last_rates: self.rates.current(),
            elapsed,
            log_path,
            recording_path,
        };
        info!(
            decoded = report.stats.decoded_frames,
            discarded = report.stats.discarded_buffers,
            fetch_failures = report.stats.fetch_failures,
            decode_failures = report.stats.decode_failures,
            sink_errors = report.stats.sink_errors,
            elapsed_ms = elapsed.as_millis() as u64,
            "Session complete"
        );
        Ok(report)
    }

    fn run_loop(&mut self, deadline: Instant) -> StopReason {
        let poll = self.config.acquisition.poll_interval;
        loop {
            self.state = AcquisitionState::WaitingForReady;
            if self.context.stop_requested() {
                return StopReason::Aborted;
            }
            if self.context.is_overflowed() {
                return StopReason::FifoOverflow;
            }
            let now = Instant::now();
            if now >= deadline {
                return StopReason::DeadlineReached;
            }
            if !self.context.is_ready() {
                self.context.wait_for_event(poll.min(deadline - now));
                continue;
            }

            self.state = AcquisitionState::ResolvingStale;
            // Clear before sampling the count so a completion racing with this
            // cycle re-arms the flag for the next one.
            self.context.clear_ready();
            let resolution = self.resolver.resolve(self.context.completed_count());
            if !resolution.has_pending() {
                continue;
            }
            if resolution.discard > 0 {
                match discard_stale(&mut self.source, resolution.discard) {
                    Ok(released) => {
                        self.stats.discarded_buffers += released;
                        debug!(pending = resolution.pending, released, "Discarded stale buffers");
                    }
                    Err(e) => return StopReason::SourceFailure(e.to_string()),
                }
            }

            if let Some(reason) = self.consume_latest() {
                return reason;
            }
        }
    }

    /// Fetch, decode, classify, forward and release the newest buffer.
    fn consume_latest(&mut self) -> Option<StopReason> {
        self.state = AcquisitionState::Fetching;
        let decoded = match self.source.fetch_latest_buffer() {
            Ok(buffer) => {
                self.state = AcquisitionState::Decoding;
                self.decoder.decode_into(buffer.bytes(), &mut self.frame)
            }
            Err(e) => {
                self.stats.fetch_failures += 1;
                if let Err(reason) = self.release() {
                    return Some(reason);
                }
                if e.is_recoverable() {
                    debug!(error = %e, "No buffer available");
                    return None;
                }
                error!(source = self.source.name(), error = %e, "Buffer fetch failed");
                return Some(StopReason::SourceFailure(e.to_string()));
            }
        };

        match decoded {
            Ok(metadata) => {
                self.state = AcquisitionState::ClassifyingAndRating;
                let rates = self.rates.observe(&metadata, Instant::now());
                let roi = self.roi.classify(&self.frame);
                self.log.push(LogRow {
                    device_time_ticks: metadata.device_time_ticks,
                    frame_counter: metadata.frame_counter,
                    device_rate: rates.device,
                    calculated_rate: rates.calculated,
                    wall_clock: Local::now(),
                    roi_state: roi.state,
                    roi_width: self.config.frame.width,
                    roi_height: self.config.frame.height,
                });
                self.stats.decoded_frames += 1;
                info!(
                    target: "capture::frame",
                    frame = metadata.frame_counter,
                    device_fps = rates.device,
                    calculated_fps = rates.calculated,
                    device_ms = self.config.metadata.clock.ticks_to_millis(metadata.device_time_ticks),
                    roi = roi.state,
                    "frame"
                );

                self.state = AcquisitionState::Forwarding;
                if self.recording {
                    if let Err(e) = self.sink.write_frame(self.frame.pixels()) {
                        self.stats.sink_errors += 1;
                        warn!(frame = metadata.frame_counter, error = %e, "Recording sink rejected frame");
                    }
                }
            }
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!(error = %e, "Frame decode failed, skipping");
            }
        }

        if let Err(reason) = self.release() {
            return Some(reason);
        }

        match self.config.acquisition.frame_limit {
            Some(limit) if self.stats.decoded_frames >= limit => Some(StopReason::FrameLimitReached),
            _ => None,
        }
    }

    fn release(&mut self) -> Result<(), StopReason> {
        self.state = AcquisitionState::Releasing;
        self.source.release_buffer().map_err(|e| {
            error!(error = %e, "Buffer release failed");
            StopReason::SourceFailure(e.to_string())
        })
    }

    fn close_sink(&mut self) {
        if !self.recording {
            return;
        }
        self.recording = false;
        if let Err(e) = self.sink.close() {
            warn!(error = %e, "Failed to close recording sink");
        }
    }

    fn abort_source(&mut self) {
        if let Err(e) = self.source.abort() {
            warn!(source = self.source.name(), error = %e, "Frame source abort failed");
        }
    }
}
