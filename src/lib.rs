//! snapstream
//!
//! Periodic snapshot-camera frame pipeline: poll a camera's HTTP snapshot
//! endpoint, decode the JPEG, run optional object detection, draw
//! annotations, hand the frame to a render sink, and optionally append it
//! to an AVI recording.
//!
//! # Module Structure
//!
//! - `frame`: decoded RGB8 pixel buffers
//! - `source`: snapshot acquisition (HTTP, plus `stub://` for tests)
//! - `decode`: encoded bytes -> `Frame`
//! - `detect`: pluggable detection backends (none, YOLO, SSD)
//! - `annotate`: bounding boxes, labels, summary overlay
//! - `record`: AVI recording sessions
//! - `pipeline`: the tick loop and its start/stop/rate-change state machine
//! - `config`: file + environment configuration
//!
//! The pipeline runs on a dedicated worker thread owned by
//! [`PipelineController`]; callers interact through its control surface
//! and a [`RenderSink`] they inject.

pub mod annotate;
pub mod config;
pub mod decode;
pub mod detect;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod record;
pub mod source;

pub use annotate::{Annotator, AnnotatorConfig};
pub use config::SnapstreamConfig;
pub use decode::decode;
pub use detect::{
    BackendKind, BoundingBox, Detection, DetectionEngine, DetectorBackend, Preprocess,
};
pub use error::{ControlError, DecodeError, FetchError, ModelLoadError, RecordError};
pub use frame::Frame;
pub use pipeline::{
    ChannelSink, PipelineController, PipelineState, RenderSink, SessionConfig, StreamStatus,
};
pub use record::{recording_file_name, Recorder, RecordingSession};
pub use source::{SnapshotSource, SourceStats};
