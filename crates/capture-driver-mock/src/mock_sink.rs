//! In-memory recording sink for tests.
//!
//! Keeps no pixel data, only what a test needs to check the forwarding contract:
//! the `open` arguments, frame count, a running checksum and whether `close` ran.

use capture_core::error::SinkError;
use capture_core::sink::{RecordingSink, VideoCodec};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arguments of the last `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedRecording {
    /// Output path requested by the loop.
    pub path: PathBuf,
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
    /// Playback rate.
    pub fps: u32,
    /// Requested codec.
    pub codec: VideoCodec,
}

/// Observed sink activity.
#[derive(Debug, Default, Clone)]
pub struct SinkRecord {
    /// Set by `open`.
    pub opened: Option<OpenedRecording>,
    /// Frames accepted.
    pub frames: u64,
    /// Frames rejected by injected failures.
    pub rejected: u64,
    /// Sum of every byte of every accepted frame.
    pub checksum: u64,
    /// Set by `close`.
    pub closed: bool,
}

/// Recording sink that only counts.
#[derive(Debug, Clone, Default)]
pub struct MockRecordingSink {
    record: Arc<Mutex<SinkRecord>>,
    fail_every: Option<u64>,
}

impl MockRecordingSink {
    /// Sink that accepts every frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that rejects every `n`-th write.
    pub fn failing_every(n: u64) -> Self {
        Self {
            fail_every: Some(n),
            ..Self::default()
        }
    }

    /// Snapshot of the activity so far. Clones share the same record.
    pub fn record(&self) -> SinkRecord {
        self.record.lock().clone()
    }
}

impl RecordingSink for MockRecordingSink {
    fn open(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        codec: VideoCodec,
    ) -> Result<(), SinkError> {
        let mut record = self.record.lock();
        *record = SinkRecord {
            opened: Some(OpenedRecording {
                path: path.to_path_buf(),
                width,
                height,
                fps,
                codec,
            }),
            ..SinkRecord::default()
        };
        Ok(())
    }

    fn write_frame(&mut self, pixels: &[u8]) -> Result<(), SinkError> {
        let mut record = self.record.lock();
        let opened = record.opened.as_ref().ok_or(SinkError::NotOpen)?;
        let expected = opened.width as usize * opened.height as usize;
        if pixels.len() != expected {
            return Err(SinkError::FrameSize {
                expected,
                actual: pixels.len(),
            });
        }

        let attempt = record.frames + record.rejected + 1;
        if self.fail_every.is_some_and(|n| n > 0 && attempt % n == 0) {
            record.rejected += 1;
            return Err(SinkError::Io(std::io::Error::other("injected write failure")));
        }

        record.frames += 1;
        record.checksum = pixels
            .iter()
            .fold(record.checksum, |acc, &p| acc.wrapping_add(u64::from(p)));
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let mut record = self.record.lock();
        if record.opened.is_none() {
            return Err(SinkError::NotOpen);
        }
        record.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_frames() {
        let mut sink = MockRecordingSink::new();
        let probe = sink.clone();

        sink.open(Path::new("out.y8"), 2, 2, 182, VideoCodec::Raw).unwrap();
        sink.write_frame(&[1, 2, 3, 4]).unwrap();
        sink.write_frame(&[1, 1, 1, 1]).unwrap();
        sink.close().unwrap();

        let record = probe.record();
        assert_eq!(record.frames, 2);
        assert_eq!(record.checksum, 14);
        assert!(record.closed);
        assert_eq!(record.opened.unwrap().fps, 182);
    }

    #[test]
    fn test_injected_failures() {
        let mut sink = MockRecordingSink::failing_every(2);
        sink.open(Path::new("out.y8"), 1, 1, 30, VideoCodec::Raw).unwrap();

        assert!(sink.write_frame(&[0]).is_ok());
        assert!(sink.write_frame(&[0]).is_err());
        assert!(sink.write_frame(&[0]).is_ok());
        assert_eq!(sink.record().rejected, 1);
    }

    #[test]
    fn test_write_before_open() {
        let mut sink = MockRecordingSink::new();
        assert!(matches!(sink.write_frame(&[0]), Err(SinkError::NotOpen)));
    }
}
