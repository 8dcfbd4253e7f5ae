//! Recording Sink interface and the built-in sinks.
//!
//! The sink receives one decoded frame per acquisition cycle and owns its own
//! buffering and file I/O. Encoding is the sink's business; the core only names
//! the codec it wants.
//!
//! - [`RawVideoSink`]: uncompressed 8-bit frames appended to a single file
//! - [`NullSink`]: accepts and drops every frame (recording disabled)

use crate::error::SinkError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Codec requested from the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    /// Uncompressed 8-bit grayscale frames.
    #[default]
    Raw,
    /// MPEG-4 part 2.
    Mpeg4,
    /// H.264 / AVC.
    H264,
}

impl VideoCodec {
    /// File extension conventionally used for this codec.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            VideoCodec::Raw => "y8",
            VideoCodec::Mpeg4 | VideoCodec::H264 => "avi",
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            VideoCodec::Raw => "raw",
            VideoCodec::Mpeg4 => "mpeg4",
            VideoCodec::H264 => "h264",
        };
        write!(f, "{}", label)
    }
}

/// Downstream consumer of decoded frames.
///
/// # Contract
///
/// - `write_frame` is called serially from the acquisition loop and must not
///   block beyond a bounded amount of time.
/// - `close` flushes and finalizes; it is called exactly once at session end.
pub trait RecordingSink: Send {
    /// Prepare the output at `path` for frames of `width`x`height` at `fps`.
    fn open(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        codec: VideoCodec,
    ) -> Result<(), SinkError>;

    /// Accept one frame of row-major 8-bit pixels.
    fn write_frame(&mut self, pixels: &[u8]) -> Result<(), SinkError>;

    /// Flush and finalize the recording.
    fn close(&mut self) -> Result<(), SinkError>;
}

impl<T: RecordingSink + ?Sized> RecordingSink for Box<T> {
    fn open(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        codec: VideoCodec,
    ) -> Result<(), SinkError> {
        (**self).open(path, width, height, fps, codec)
    }

    fn write_frame(&mut self, pixels: &[u8]) -> Result<(), SinkError> {
        (**self).write_frame(pixels)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}

// ============================================================================
// NullSink
// ============================================================================

/// Sink that discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RecordingSink for NullSink {
    fn open(&mut self, _: &Path, _: u32, _: u32, _: u32, _: VideoCodec) -> Result<(), SinkError> {
        Ok(())
    }

    fn write_frame(&mut self, _pixels: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

// ============================================================================
// RawVideoSink
// ============================================================================

struct OpenRecording {
    writer: BufWriter<File>,
    path: PathBuf,
    frame_bytes: usize,
}

/// Appends uncompressed 8-bit frames to a single file.
///
/// Only [`VideoCodec::Raw`] is accepted; compressed codecs belong to an external
/// encoder.
#[derive(Default)]
pub struct RawVideoSink {
    recording: Option<OpenRecording>,
    frames_written: u64,
}

impl RawVideoSink {
    /// Create a closed sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames written since the last `open`.
    #[must_use]
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl RecordingSink for RawVideoSink {
    fn open(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        codec: VideoCodec,
    ) -> Result<(), SinkError> {
        if codec != VideoCodec::Raw {
            return Err(SinkError::UnsupportedCodec(codec.to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        tracing::info!(path = %path.display(), width, height, fps, %codec, "Recording opened");

        self.recording = Some(OpenRecording {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            frame_bytes: width as usize * height as usize,
        });
        self.frames_written = 0;
        Ok(())
    }

    fn write_frame(&mut self, pixels: &[u8]) -> Result<(), SinkError> {
        let recording = self.recording.as_mut().ok_or(SinkError::NotOpen)?;
        if pixels.len() != recording.frame_bytes {
            return Err(SinkError::FrameSize {
                expected: recording.frame_bytes,
                actual: pixels.len(),
            });
        }
        recording.writer.write_all(pixels)?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let mut recording = self.recording.take().ok_or(SinkError::NotOpen)?;
        recording.writer.flush()?;
        tracing::info!(
            path = %recording.path.display(),
            frames = self.frames_written,
            "Recording closed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_sink_appends_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video").join("session.y8");
        let mut sink = RawVideoSink::new();

        sink.open(&path, 4, 2, 30, VideoCodec::Raw).unwrap();
        sink.write_frame(&[1u8; 8]).unwrap();
        sink.write_frame(&[2u8; 8]).unwrap();
        sink.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..8], &[1u8; 8]);
        assert_eq!(&bytes[8..], &[2u8; 8]);
        assert_eq!(sink.frames_written(), 2);
    }

    #[test]
    fn test_raw_sink_rejects_compressed_codec() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = RawVideoSink::new();
        let result = sink.open(&dir.path().join("x.avi"), 4, 4, 30, VideoCodec::Mpeg4);
        assert!(matches!(result, Err(SinkError::UnsupportedCodec(_))));
    }

    #[test]
    fn test_raw_sink_requires_open() {
        let mut sink = RawVideoSink::new();
        assert!(matches!(sink.write_frame(&[0u8; 4]), Err(SinkError::NotOpen)));
        assert!(matches!(sink.close(), Err(SinkError::NotOpen)));
    }

    #[test]
    fn test_raw_sink_rejects_wrong_frame_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = RawVideoSink::new();
        sink.open(&dir.path().join("x.y8"), 4, 4, 30, VideoCodec::Raw)
            .unwrap();
        assert!(matches!(
            sink.write_frame(&[0u8; 3]),
            Err(SinkError::FrameSize { expected: 16, actual: 3 })
        ));
    }

    #[test]
    fn test_codec_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            codec: VideoCodec,
        }
        let parsed: Wrapper = figment::Figment::new()
            .merge(figment::providers::Serialized::default("codec", "h264"))
            .extract()
            .unwrap();
        assert_eq!(parsed.codec, VideoCodec::H264);
    }
}
