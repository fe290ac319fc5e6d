//! Video recording sessions.
//!
//! A [`RecordingSession`] exists exactly while recording is active: it is
//! created from the most recent decoded frame's dimensions, accepts only
//! frames of those dimensions, and flushes/releases the file on every
//! exit path. The default container is AVI with MJPG frames written by
//! the built-in muxer; the `record-ffmpeg` feature adds an XVID (MPEG-4)
//! encoder.

mod avi;
#[cfg(feature = "record-ffmpeg")]
mod ffmpeg;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;

use crate::error::RecordError;
use crate::frame::Frame;

pub use avi::AviWriter;

const JPEG_QUALITY: u8 = 85;

/// Codec selection for new sessions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Codec {
    /// JPEG frames in AVI, written by the built-in muxer.
    #[default]
    Mjpg,
    /// MPEG-4 with the XVID fourcc, via ffmpeg.
    #[cfg(feature = "record-ffmpeg")]
    Xvid,
}

/// `stream_<YYYYMMDDHHMMSS>.avi`, from wall-clock time at open.
pub fn recording_file_name(now: DateTime<Local>) -> String {
    format!("stream_{}.avi", now.format("%Y%m%d%H%M%S"))
}

/// Factory for recording sessions; holds the output directory and codec.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    output_dir: PathBuf,
    codec: Codec,
}

impl Recorder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            codec: Codec::default(),
        }
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Open a session named after the current wall-clock time.
    pub fn begin(
        &self,
        frame_rate: u32,
        dimensions: (u32, u32),
    ) -> Result<RecordingSession, RecordError> {
        let path = self.output_dir.join(recording_file_name(Local::now()));
        RecordingSession::open(&path, self.codec, frame_rate, dimensions)
    }
}

enum SessionBackend {
    Mjpg(AviWriter<BufWriter<File>>),
    #[cfg(feature = "record-ffmpeg")]
    Xvid(ffmpeg::XvidRecorder),
}

/// The open video-file context active only while recording.
pub struct RecordingSession {
    path: PathBuf,
    width: u32,
    height: u32,
    frame_rate: u32,
    created_at: DateTime<Local>,
    frames_written: u64,
    backend: Option<SessionBackend>,
}

impl RecordingSession {
    /// Open the container at `path`. Dimensions are fixed for the
    /// session's lifetime.
    pub fn open(
        path: &Path,
        codec: Codec,
        frame_rate: u32,
        dimensions: (u32, u32),
    ) -> Result<Self, RecordError> {
        let (width, height) = dimensions;
        let backend = match codec {
            Codec::Mjpg => {
                let file = File::create(path).map_err(|source| RecordError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
                let writer = AviWriter::new(BufWriter::new(file), width, height, frame_rate)
                    .map_err(RecordError::Write)?;
                SessionBackend::Mjpg(writer)
            }
            #[cfg(feature = "record-ffmpeg")]
            Codec::Xvid => {
                SessionBackend::Xvid(ffmpeg::XvidRecorder::open(path, frame_rate, dimensions)?)
            }
        };
        log::info!(
            "recording {}x{} at {} fps to {}",
            width,
            height,
            frame_rate,
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            frame_rate,
            created_at: Local::now(),
            frames_written: 0,
            backend: Some(backend),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append one frame. A dimension mismatch is fatal to the session:
    /// nothing is appended and the caller is expected to close.
    pub fn write(&mut self, frame: &Frame) -> Result<(), RecordError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(RecordError::DimensionMismatch {
                want_width: self.width,
                want_height: self.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }
        let backend = self
            .backend
            .as_mut()
            .expect("session backend present until close");
        match backend {
            SessionBackend::Mjpg(writer) => {
                let mut jpeg = Vec::new();
                JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
                    .encode(
                        frame.data(),
                        frame.width(),
                        frame.height(),
                        image::ExtendedColorType::Rgb8,
                    )
                    .map_err(|e| RecordError::Encode(e.to_string()))?;
                writer.write_jpeg_frame(&jpeg).map_err(RecordError::Write)?;
            }
            #[cfg(feature = "record-ffmpeg")]
            SessionBackend::Xvid(recorder) => recorder.write(frame)?,
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Flush the index/trailer and release the file.
    pub fn close(mut self) -> Result<(), RecordError> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<(), RecordError> {
        let Some(backend) = self.backend.take() else {
            return Ok(());
        };
        match backend {
            SessionBackend::Mjpg(writer) => {
                writer
                    .finalize()
                    .map_err(|e| RecordError::Finalize(e.to_string()))?;
            }
            #[cfg(feature = "record-ffmpeg")]
            SessionBackend::Xvid(recorder) => recorder.close()?,
        }
        log::info!(
            "closed recording {} ({} frames)",
            self.path.display(),
            self.frames_written
        );
        Ok(())
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        // close() normally runs first; this covers early exits so the file
        // handle is always released with a valid index.
        if self.backend.is_some() {
            if let Err(e) = self.close_inner() {
                log::warn!("recording {} not finalized: {}", self.path.display(), e);
            }
        }
    }
}
