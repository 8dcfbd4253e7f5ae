//! Simulated interrupt-driven frame grabber.
//!
//! Models a board with a fixed ring of capture buffers:
//!
//! - Completed buffers queue up oldest-first until released. `fetch_latest_buffer`
//!   borrows the head of that queue and `release_buffer` pops it, so after the
//!   consumer has released its stale buffers the head is the newest frame.
//! - Every completion calls the registered [`BufferReadySignal`] from the producer
//!   context (the caller's thread in manual mode, a dedicated thread when free-running).
//! - When free-running, a completion with no free buffer in the ring raises
//!   `FIFO_OVERFLOW` instead of writing, as the hardware does when the consumer
//!   falls a full ring behind.
//! - In manual mode the ring is overwritten round-robin, so a test can complete more
//!   frames than there are buffers before the consumer runs.
//!
//! A [`SourceProbe`] counts every call so tests can check the fetch/release
//! discipline from outside the session.

use crate::common::{FaultConfig, FrameTiming, ProducerMode};
use crate::pattern::{render_frame, stamp_metadata, LedPattern};
use capture_core::config::{FrameGeometry, SourceSettings};
use capture_core::decoder::{FrameMetadata, MetadataLayout};
use capture_core::error::{SourceError, SourceErrorKind};
use capture_core::signal::{BufferReadySignal, EventMask};
use capture_core::source::{BufferHandle, FrameSource, FrameSourceDriver, RawBuffer};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Name reported by the mock source.
pub const SOURCE_TYPE: &str = "mock_grabber";

/// Behavior of the simulated grabber.
#[derive(Debug, Clone, Default)]
pub struct MockSourceConfig {
    /// How frames are produced.
    pub mode: ProducerMode,
    /// Injected operation failures.
    pub faults: FaultConfig,
    /// Blinking indicator drawn into every frame.
    pub led: LedPattern,
    /// Where the firmware stamps its counters.
    pub layout: MetadataLayout,
    /// Extra bytes after each frame in a pool slot.
    pub slot_padding: usize,
    /// Fetch numbers (1-based) that deliver a truncated payload.
    pub short_fetches: Vec<u64>,
    /// Every n-th completion re-delivers the previous frame unchanged.
    pub duplicate_every: Option<u64>,
}

/// Call counters shared with tests.
#[derive(Debug, Default)]
pub struct SourceProbe {
    acquired: AtomicU64,
    starts: AtomicU64,
    fetches: AtomicU64,
    release_calls: AtomicU64,
    releases: AtomicU64,
    empty_releases: AtomicU64,
    fetch_while_held: AtomicU64,
    aborts: AtomicU64,
    frames_completed: AtomicU64,
    overflows: AtomicU64,
    settings: Mutex<Option<SourceSettings>>,
}

macro_rules! probe_getters {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(&self) -> u64 {
                self.$name.load(Ordering::Acquire)
            }
        )*
    };
}

impl SourceProbe {
    probe_getters!(
        /// Sessions acquired.
        acquired,
        /// Successful `start` calls.
        starts,
        /// Successful fetches.
        fetches,
        /// `release_buffer` calls, including failed ones.
        release_calls,
        /// Releases that returned a buffer to the ring.
        releases,
        /// Releases with nothing held (no-ops).
        empty_releases,
        /// Fetches issued while a previously fetched buffer was still held.
        fetch_while_held,
        /// `abort` calls.
        aborts,
        /// Buffers written by the producer.
        frames_completed,
        /// FIFO overflows raised.
        overflows,
    );

    /// Settings passed to the last `acquire_session`.
    pub fn settings(&self) -> Option<SourceSettings> {
        self.settings.lock().clone()
    }

    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::AcqRel) + 1
    }
}

struct Pool {
    slots: Vec<Vec<u8>>,
    /// Completed, unreleased slots, oldest first.
    queue: VecDeque<usize>,
    next_slot: usize,
    produced: u64,
    last_metadata: Option<FrameMetadata>,
    signal: Option<BufferReadySignal>,
}

struct Shared {
    pool: Mutex<Pool>,
    running: AtomicBool,
    geometry: FrameGeometry,
    timing: FrameTiming,
    settings: SourceSettings,
    config: MockSourceConfig,
    probe: Arc<SourceProbe>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Completion {
    Fresh,
    Duplicate,
}

impl Shared {
    fn frame_bytes(&self) -> usize {
        self.geometry.width as usize * self.geometry.height as usize
    }

    /// Write the next frame into the ring and notify. Returns false if the
    /// session is not running.
    fn complete(&self, completion: Completion, overwrite: bool) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }

        let mut pool = self.pool.lock();
        if !overwrite && pool.queue.len() >= pool.slots.len() {
            let signal = pool.signal.clone();
            drop(pool);
            SourceProbe::bump(&self.probe.overflows);
            if let Some(signal) = signal {
                signal.notify(EventMask::FIFO_OVERFLOW);
            }
            return true;
        }

        let slot = pool.next_slot;
        pool.next_slot = (slot + 1) % pool.slots.len();

        let metadata = match (completion, pool.last_metadata) {
            (Completion::Duplicate, Some(previous)) => previous,
            _ => {
                let index = pool.produced;
                pool.produced += 1;
                FrameMetadata {
                    frame_counter: if self.settings.frame_counter_stamp { index as u32 } else { 0 },
                    device_time_ticks: if self.settings.timestamp_stamp {
                        self.timing.ticks_at(index)
                    } else {
                        0
                    },
                    frame_tag: if self.settings.frame_counter_stamp { (index as u32).wrapping_add(1) } else { 0 },
                }
            }
        };
        pool.last_metadata = Some(metadata);

        let frame_bytes = self.frame_bytes();
        let index = pool.produced.saturating_sub(1);
        let buf = &mut pool.slots[slot][..frame_bytes];
        render_frame(buf, self.geometry.width, self.geometry.height, index, &self.config.led);
        stamp_metadata(buf, &self.config.layout, &metadata);

        pool.queue.push_back(slot);
        let signal = pool.signal.clone();
        drop(pool);

        SourceProbe::bump(&self.probe.frames_completed);
        if let Some(signal) = signal {
            signal.notify(EventMask::BUFFER_READY);
        }
        true
    }

    fn produce_free_running(&self) {
        let completed = self.probe.frames_completed();
        let completion = match self.config.duplicate_every {
            Some(n) if n > 0 && completed > 0 && (completed + 1) % n == 0 => Completion::Duplicate,
            _ => Completion::Fresh,
        };
        self.complete(completion, false);
    }

    fn raise_overflow(&self) {
        let signal = self.pool.lock().signal.clone();
        SourceProbe::bump(&self.probe.overflows);
        if let Some(signal) = signal {
            signal.notify(EventMask::FIFO_OVERFLOW);
        }
    }
}

/// Opens simulated grabber sessions.
pub struct MockFrameSourceDriver {
    config: MockSourceConfig,
    probe: Arc<SourceProbe>,
    session: Arc<Mutex<Option<Arc<Shared>>>>,
}

impl MockFrameSourceDriver {
    /// Driver with the given behavior.
    pub fn new(config: MockSourceConfig) -> Self {
        Self {
            config,
            probe: Arc::new(SourceProbe::default()),
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Manual driver that completes `preload` frames when the session starts.
    pub fn manual(preload: u32) -> Self {
        Self::new(MockSourceConfig {
            mode: ProducerMode::Manual { preload },
            ..Default::default()
        })
    }

    /// Free-running driver producing at the configured camera rate.
    pub fn free_running() -> Self {
        Self::new(MockSourceConfig {
            mode: ProducerMode::FreeRunning,
            ..Default::default()
        })
    }

    /// Call counters for sessions opened by this driver.
    pub fn probe(&self) -> Arc<SourceProbe> {
        Arc::clone(&self.probe)
    }

    /// Handle for completing frames by hand on the current session.
    pub fn producer(&self) -> MockProducer {
        MockProducer {
            session: Arc::clone(&self.session),
        }
    }
}

impl FrameSourceDriver for MockFrameSourceDriver {
    type Session = MockFrameSource;

    fn acquire_session(
        &self,
        settings: &SourceSettings,
        geometry: FrameGeometry,
    ) -> Result<MockFrameSource, SourceError> {
        self.config.faults.check_operation(SOURCE_TYPE, "acquire")?;

        if settings.buffer_count == 0 {
            return Err(SourceError::new(
                SOURCE_TYPE,
                SourceErrorKind::Configuration,
                "buffer pool must hold at least one buffer",
            ));
        }
        if let Some(path) = &settings.config_file {
            if !path.exists() {
                return Err(SourceError::new(
                    SOURCE_TYPE,
                    SourceErrorKind::Configuration,
                    format!("configuration file '{}' not found", path.display()),
                ));
            }
        }
        let frame_bytes = geometry.width as usize * geometry.height as usize;
        if frame_bytes < self.config.layout.required_bytes() {
            return Err(SourceError::new(
                SOURCE_TYPE,
                SourceErrorKind::Configuration,
                format!("{}x{} frame cannot carry the metadata stamp", geometry.width, geometry.height),
            ));
        }

        let slot_bytes = frame_bytes + self.config.slot_padding;
        let shared = Arc::new(Shared {
            pool: Mutex::new(Pool {
                slots: vec![vec![0u8; slot_bytes]; settings.buffer_count],
                queue: VecDeque::with_capacity(settings.buffer_count),
                next_slot: 0,
                produced: 0,
                last_metadata: None,
                signal: None,
            }),
            running: AtomicBool::new(false),
            geometry,
            timing: FrameTiming::camera(settings.camera_fps),
            settings: settings.clone(),
            config: self.config.clone(),
            probe: Arc::clone(&self.probe),
        });

        *self.probe.settings.lock() = Some(settings.clone());
        SourceProbe::bump(&self.probe.acquired);
        *self.session.lock() = Some(Arc::clone(&shared));

        tracing::info!(
            board = ?settings.board,
            channel = ?settings.channel,
            buffers = settings.buffer_count,
            camera_fps = settings.camera_fps,
            exposure_us = settings.exposure_us,
            "Mock grabber session acquired"
        );

        Ok(MockFrameSource {
            shared,
            staging: Vec::with_capacity(slot_bytes),
            held: false,
            producer: None,
        })
    }
}

/// An open simulated grabber session.
pub struct MockFrameSource {
    shared: Arc<Shared>,
    staging: Vec<u8>,
    held: bool,
    producer: Option<JoinHandle<()>>,
}

impl MockFrameSource {
    fn stop_producer(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                tracing::warn!("Mock producer thread panicked");
            }
        }
    }

    fn spawn_producer(&mut self) -> Result<(), SourceError> {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("mock-grabber".into())
            .spawn(move || {
                let period = shared.timing.frame_period();
                let mut next = Instant::now() + period;
                while shared.running.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    }
                    shared.produce_free_running();
                    next += period;
                }
            })
            .map_err(|e| {
                SourceError::new(
                    SOURCE_TYPE,
                    SourceErrorKind::Hardware,
                    format!("failed to spawn producer: {}", e),
                )
            })?;
        self.producer = Some(handle);
        Ok(())
    }
}

impl FrameSource for MockFrameSource {
    fn name(&self) -> &str {
        SOURCE_TYPE
    }

    fn register_callback(&mut self, signal: BufferReadySignal) -> Result<(), SourceError> {
        self.shared.config.faults.check_operation(SOURCE_TYPE, "register")?;
        self.shared.pool.lock().signal = Some(signal);
        Ok(())
    }

    fn start(&mut self) -> Result<(), SourceError> {
        self.shared.config.faults.check_operation(SOURCE_TYPE, "start")?;
        if self.shared.pool.lock().signal.is_none() {
            return Err(SourceError::new(
                SOURCE_TYPE,
                SourceErrorKind::Configuration,
                "start called before a callback was registered",
            ));
        }

        self.shared.running.store(true, Ordering::Release);
        SourceProbe::bump(&self.shared.probe.starts);
        if let Some(reg) = self.shared.settings.acq_start {
            tracing::debug!(address = reg.address, value = reg.value, "Acquisition start register written");
        }

        match self.shared.config.mode {
            ProducerMode::Manual { preload } => {
                for _ in 0..preload {
                    self.shared.complete(Completion::Fresh, true);
                }
            }
            ProducerMode::FreeRunning => self.spawn_producer()?,
        }
        Ok(())
    }

    fn fetch_latest_buffer(&mut self) -> Result<RawBuffer<'_>, SourceError> {
        self.shared.config.faults.check_operation(SOURCE_TYPE, "fetch")?;

        let pool = self.shared.pool.lock();
        let slot = *pool.queue.front().ok_or_else(|| SourceError::no_data(SOURCE_TYPE))?;

        let probe = &self.shared.probe;
        if self.held {
            SourceProbe::bump(&probe.fetch_while_held);
        }
        let fetch_number = SourceProbe::bump(&probe.fetches);

        let data = &pool.slots[slot];
        let len = if self.shared.config.short_fetches.contains(&fetch_number) {
            data.len() / 2
        } else {
            data.len()
        };
        self.staging.clear();
        self.staging.extend_from_slice(&data[..len]);
        drop(pool);

        self.held = true;
        Ok(RawBuffer::new(&self.staging, BufferHandle(slot)))
    }

    fn release_buffer(&mut self) -> Result<(), SourceError> {
        SourceProbe::bump(&self.shared.probe.release_calls);
        self.shared.config.faults.check_operation(SOURCE_TYPE, "release")?;

        let released = self.shared.pool.lock().queue.pop_front();
        match released {
            Some(_) => SourceProbe::bump(&self.shared.probe.releases),
            None => SourceProbe::bump(&self.shared.probe.empty_releases),
        };
        self.held = false;
        Ok(())
    }

    fn abort(&mut self) -> Result<(), SourceError> {
        self.stop_producer();
        SourceProbe::bump(&self.shared.probe.aborts);
        if let Some(reg) = self.shared.settings.acq_stop {
            tracing::debug!(address = reg.address, value = reg.value, "Acquisition stop register written");
        }
        self.shared.config.faults.check_operation(SOURCE_TYPE, "abort")?;
        tracing::info!(
            completed = self.shared.probe.frames_completed(),
            overflows = self.shared.probe.overflows(),
            "Mock grabber aborted"
        );
        Ok(())
    }
}

impl Drop for MockFrameSource {
    fn drop(&mut self) {
        self.stop_producer();
    }
}

/// Completes frames on the driver's current session from test code.
#[derive(Clone)]
pub struct MockProducer {
    session: Arc<Mutex<Option<Arc<Shared>>>>,
}

impl MockProducer {
    fn shared(&self) -> Option<Arc<Shared>> {
        self.session.lock().clone()
    }

    /// True once a session has been started and not yet aborted.
    pub fn is_running(&self) -> bool {
        self.shared()
            .is_some_and(|s| s.running.load(Ordering::Acquire))
    }

    /// Write a new frame into the ring (overwriting round-robin) and notify.
    pub fn complete_frame(&self) -> bool {
        self.shared()
            .is_some_and(|s| s.complete(Completion::Fresh, true))
    }

    /// Re-deliver the previous frame with the same counters and tag.
    pub fn duplicate_frame(&self) -> bool {
        self.shared()
            .is_some_and(|s| s.complete(Completion::Duplicate, true))
    }

    /// Report a FIFO overflow.
    pub fn raise_overflow(&self) -> bool {
        match self.shared() {
            Some(s) if s.running.load(Ordering::Acquire) => {
                s.raise_overflow();
                true
            }
            _ => false,
        }
    }
}
