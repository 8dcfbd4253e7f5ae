//! Append-only per-frame session log.
//!
//! Rows are buffered in memory for the whole session and written once, at session
//! end, to a headerless CSV file. Nothing touches the disk from inside the
//! acquisition loop.

use crate::error::CaptureResult;
use chrono::{DateTime, Local, SecondsFormat};
use std::fs::File;
use std::path::{Path, PathBuf};

/// `strftime` pattern for session artifact names (`MM.dd.yyyy_HH.mm.ss.fff`).
pub const SESSION_STAMP_FORMAT: &str = "%m.%d.%Y_%H.%M.%S%.3f";

/// One decoded frame as recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRow {
    /// Raw device clock ticks embedded in the frame.
    pub device_time_ticks: u32,
    /// Device frame counter.
    pub frame_counter: u32,
    /// Device-reported rate at the time of the frame.
    pub device_rate: u32,
    /// Consumer-calculated rate at the time of the frame.
    pub calculated_rate: u32,
    /// Host wall-clock time the frame was processed.
    pub wall_clock: DateTime<Local>,
    /// ROI classifier state.
    pub roi_state: bool,
    /// Capture buffer width in pixels (the grabber's acquisition window, not the
    /// classifier rectangle).
    pub roi_width: u32,
    /// Capture buffer height in pixels.
    pub roi_height: u32,
}

/// In-memory session log.
#[derive(Debug, Default)]
pub struct SessionLog {
    rows: Vec<LogRow>,
}

impl SessionLog {
    /// Create a log with room for `capacity` rows.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
        }
    }

    /// Append one row.
    pub fn push(&mut self, row: LogRow) {
        self.rows.push(row);
    }

    /// Rows recorded so far, in processing order.
    #[must_use]
    pub fn rows(&self) -> &[LogRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no frame has been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write every row to `path` as headerless CSV.
    ///
    /// Parent directories are created as needed. An empty log still produces an
    /// (empty) file so every session leaves an artifact.
    pub fn flush_to(&self, path: &Path) -> CaptureResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        for row in &self.rows {
            writer.write_record([
                row.device_time_ticks.to_string(),
                row.frame_counter.to_string(),
                row.device_rate.to_string(),
                row.calculated_rate.to_string(),
                row.wall_clock.to_rfc3339_opts(SecondsFormat::Millis, false),
                u8::from(row.roi_state).to_string(),
                row.roi_width.to_string(),
                row.roi_height.to_string(),
            ])?;
        }
        writer.flush()?;

        tracing::info!(path = %path.display(), rows = self.rows.len(), "Session log written");
        Ok(())
    }
}

/// Timestamp stem shared by the session's artifacts.
#[must_use]
pub fn session_stamp(now: DateTime<Local>) -> String {
    now.format(SESSION_STAMP_FORMAT).to_string()
}

/// `<dir>/<stamp>.<extension>`
#[must_use]
pub fn session_file_path(dir: &Path, stamp: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", stamp, extension))
}
