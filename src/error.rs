//! Error taxonomy for the frame pipeline.
//!
//! Transient per-tick failures (`FetchError`, `DecodeError`) are recovered
//! locally by the pipeline: the tick is skipped and streaming continues.
//! Setup failures (`ModelLoadError`) are surfaced before streaming can
//! begin. Recording failures (`RecordError`) end the recording session but
//! never the stream.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A snapshot could not be fetched this tick.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("endpoint returned HTTP {0}")]
    Status(u16),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("failed to read response body: {0}")]
    Body(#[from] io::Error),
    #[error("endpoint returned an empty body")]
    EmptyBody,
}

/// Fetched bytes could not be decoded into a frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized image format")]
    UnsupportedFormat,
    #[error("malformed image data: {0}")]
    Malformed(String),
}

/// A detection model could not be loaded at startup.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("incompatible model format in {path}: {reason}")]
    IncompatibleFormat { path: PathBuf, reason: String },
    #[error("class name list not found: {0}")]
    ClassListNotFound(PathBuf),
    #[error("class name list {0} is empty")]
    EmptyClassList(PathBuf),
}

/// A recording session failed to open, accept a frame, or finalize.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("frame is {got_width}x{got_height} but the session records {want_width}x{want_height}")]
    DimensionMismatch {
        want_width: u32,
        want_height: u32,
        got_width: u32,
        got_height: u32,
    },
    #[error("failed to write frame: {0}")]
    Write(#[source] io::Error),
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("failed to finalize recording: {0}")]
    Finalize(String),
}

/// A control operation on the pipeline was rejected.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no decoded frame available to size the recording")]
    NoFrameAvailable,
    #[error("frame rate {0} is outside 1..=60")]
    InvalidFrameRate(u32),
    #[error("pipeline is not streaming")]
    NotStreaming,
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("pipeline worker is gone")]
    Disconnected,
}
