//! The frame pipeline and its controlling state machine.
//!
//! A [`PipelineController`] owns a dedicated worker thread that runs the
//! tick loop: fetch -> decode -> detect -> annotate -> render sink, and
//! while recording, -> recorder. Control operations are messages on a
//! channel with synchronous replies, so all session state lives on the
//! worker thread and callers never race it. Ticks are strictly
//! sequential; there is exactly one tick deadline, and rescheduling
//! replaces it.
//!
//! Error policy: fetch/decode failures skip the tick and leave state
//! unchanged; recording failures close the session and drop back to
//! plain streaming; nothing in the tick loop can stop the stream.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::annotate::Annotator;
use crate::config::{MAX_FRAME_RATE, MIN_FRAME_RATE};
use crate::decode::decode;
use crate::detect::{center_offset, BackendKind, DetectionEngine};
use crate::error::ControlError;
use crate::frame::Frame;
use crate::record::{Recorder, RecordingSession};
use crate::source::SnapshotSource;

/// Receives each finished annotated frame. Implementations run on the
/// pipeline worker thread and should hand off quickly.
pub trait RenderSink: Send {
    fn present(&mut self, frame: &Frame);
}

/// Queue-backed sink: clones each finished frame into a channel.
pub struct ChannelSink {
    tx: Sender<Frame>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Frame>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl RenderSink for ChannelSink {
    fn present(&mut self, frame: &Frame) {
        // A gone receiver just means nobody is watching.
        let _ = self.tx.send(frame.clone());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Streaming,
    StreamingAndRecording,
}

/// Point-in-time readback of the session.
#[derive(Clone, Debug)]
pub struct StreamStatus {
    pub state: PipelineState,
    pub frame_rate: u32,
    pub backend: BackendKind,
    pub frames_rendered: u64,
    pub frames_recorded: u64,
    pub fetch_failures: u64,
    pub decode_failures: u64,
    pub last_recording: Option<PathBuf>,
    pub last_error: Option<String>,
    /// Horizontal offset of the class of interest from frame center, from
    /// the most recent rendered tick.
    pub target_offset_x: Option<i32>,
}

/// Initial session parameters.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub frame_rate: u32,
    pub confidence_threshold: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            confidence_threshold: 0.5,
        }
    }
}

enum Command {
    Start(Sender<Result<(), ControlError>>),
    Stop(Sender<Result<(), ControlError>>),
    BeginRecording(Sender<Result<PathBuf, ControlError>>),
    EndRecording(Sender<Result<(), ControlError>>),
    SetFrameRate(u32, Sender<Result<(), ControlError>>),
    Shutdown,
}

/// Handle to the pipeline worker. Dropping it shuts the worker down,
/// closing any open recording first.
pub struct PipelineController {
    commands: Sender<Command>,
    status: Arc<Mutex<StreamStatus>>,
    worker: Option<JoinHandle<()>>,
}

impl PipelineController {
    /// Spawn the worker. The detection engine is already loaded at this
    /// point; model-load failures surface from
    /// [`DetectionEngine::from_settings`] before a controller can exist.
    pub fn spawn(
        config: SessionConfig,
        source: SnapshotSource,
        engine: DetectionEngine,
        annotator: Annotator,
        recorder: Recorder,
        sink: Box<dyn RenderSink>,
    ) -> Self {
        let frame_rate = config.frame_rate.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
        if frame_rate != config.frame_rate {
            log::warn!(
                "frame rate {} clamped to {}",
                config.frame_rate,
                frame_rate
            );
        }

        let status = Arc::new(Mutex::new(StreamStatus {
            state: PipelineState::Idle,
            frame_rate,
            backend: engine.kind(),
            frames_rendered: 0,
            frames_recorded: 0,
            fetch_failures: 0,
            decode_failures: 0,
            last_recording: None,
            last_error: None,
            target_offset_x: None,
        }));

        let (tx, rx) = mpsc::channel();
        let worker = Worker {
            commands: rx,
            source,
            engine,
            annotator,
            recorder,
            sink,
            confidence_threshold: config.confidence_threshold,
            frame_rate,
            interval: interval_for(frame_rate),
            streaming: false,
            recording: None,
            next_tick: None,
            last_dims: None,
            frames_rendered: 0,
            frames_recorded: 0,
            fetch_failures: 0,
            decode_failures: 0,
            last_recording: None,
            last_error: None,
            target_offset_x: None,
            status: Arc::clone(&status),
        };
        let handle = thread::Builder::new()
            .name("snapstream-pipeline".to_string())
            .spawn(move || worker.run())
            .expect("spawn pipeline worker");

        Self {
            commands: tx,
            status,
            worker: Some(handle),
        }
    }

    /// Begin periodic ticking. No-op while already streaming.
    pub fn start(&self) -> Result<(), ControlError> {
        self.roundtrip(Command::Start)
    }

    /// Halt ticking, closing any open recording first. No-op while idle.
    pub fn stop(&self) -> Result<(), ControlError> {
        self.roundtrip(Command::Stop)
    }

    /// Open a recording session sized from the most recent decoded frame.
    /// Returns the file path. While already recording, returns the open
    /// session's path.
    pub fn begin_recording(&self) -> Result<PathBuf, ControlError> {
        self.roundtrip(Command::BeginRecording)
    }

    /// Close the recording session. No-op while not recording.
    pub fn end_recording(&self) -> Result<(), ControlError> {
        self.roundtrip(Command::EndRecording)
    }

    /// Replace the tick interval, effective no later than the next tick.
    pub fn set_frame_rate(&self, rate: u32) -> Result<(), ControlError> {
        if !(MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&rate) {
            return Err(ControlError::InvalidFrameRate(rate));
        }
        self.roundtrip(|reply| Command::SetFrameRate(rate, reply))
    }

    pub fn status(&self) -> StreamStatus {
        self.status.lock().expect("status lock").clone()
    }

    fn roundtrip<T>(
        &self,
        make: impl FnOnce(Sender<Result<T, ControlError>>) -> Command,
    ) -> Result<T, ControlError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(make(reply_tx))
            .map_err(|_| ControlError::Disconnected)?;
        reply_rx.recv().map_err(|_| ControlError::Disconnected)?
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn interval_for(rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / rate.max(1) as f64)
}

struct Worker {
    commands: Receiver<Command>,
    source: SnapshotSource,
    engine: DetectionEngine,
    annotator: Annotator,
    recorder: Recorder,
    sink: Box<dyn RenderSink>,
    confidence_threshold: f32,
    frame_rate: u32,
    interval: Duration,
    streaming: bool,
    recording: Option<RecordingSession>,
    /// The single tick deadline; `Some` exactly while streaming.
    next_tick: Option<Instant>,
    last_dims: Option<(u32, u32)>,
    frames_rendered: u64,
    frames_recorded: u64,
    fetch_failures: u64,
    decode_failures: u64,
    last_recording: Option<PathBuf>,
    last_error: Option<String>,
    target_offset_x: Option<i32>,
    status: Arc<Mutex<StreamStatus>>,
}

impl Worker {
    fn run(mut self) {
        loop {
            let command = match self.next_tick {
                None => match self.commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match self.commands.recv_timeout(timeout) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            };

            match command {
                Some(Command::Shutdown) => break,
                Some(command) => self.handle(command),
                None => self.tick(),
            }
            self.push_status();
        }

        // Recording is never left dangling, shutdown included.
        self.close_recording();
        self.push_status();
    }

    // Every arm publishes the new status before replying, so a caller
    // that queries right after a control call observes its effect.
    fn handle(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                if !self.streaming {
                    self.streaming = true;
                    self.next_tick = Some(Instant::now());
                    log::info!("streaming started at {} fps", self.frame_rate);
                }
                self.push_status();
                let _ = reply.send(Ok(()));
            }
            Command::Stop(reply) => {
                if self.streaming {
                    self.close_recording();
                    self.streaming = false;
                    self.next_tick = None;
                    log::info!("streaming stopped");
                }
                self.push_status();
                let _ = reply.send(Ok(()));
            }
            Command::BeginRecording(reply) => {
                let result = self.begin_recording();
                self.push_status();
                let _ = reply.send(result);
            }
            Command::EndRecording(reply) => {
                self.close_recording();
                self.push_status();
                let _ = reply.send(Ok(()));
            }
            Command::SetFrameRate(rate, reply) => {
                self.frame_rate = rate;
                self.interval = interval_for(rate);
                // Cancel the existing deadline, install one at the new
                // interval.
                if self.streaming {
                    self.next_tick = Some(Instant::now() + self.interval);
                }
                log::info!("frame rate set to {} fps", rate);
                self.push_status();
                let _ = reply.send(Ok(()));
            }
            Command::Shutdown => unreachable!("shutdown is handled by the run loop"),
        }
    }

    fn begin_recording(&mut self) -> Result<PathBuf, ControlError> {
        if !self.streaming {
            return Err(ControlError::NotStreaming);
        }
        if let Some(session) = &self.recording {
            return Ok(session.path().to_path_buf());
        }
        let dims = self.last_dims.ok_or(ControlError::NoFrameAvailable)?;
        let session = self
            .recorder
            .begin(self.frame_rate, dims)
            .map_err(ControlError::Record)?;
        let path = session.path().to_path_buf();
        self.last_recording = Some(path.clone());
        self.recording = Some(session);
        Ok(path)
    }

    fn close_recording(&mut self) {
        if let Some(session) = self.recording.take() {
            let path = session.path().to_path_buf();
            if let Err(e) = session.close() {
                log::error!("failed to finalize {}: {}", path.display(), e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// One fetch -> decode -> detect -> annotate -> render (-> record)
    /// pass. Transient failures skip the tick; only recording failures
    /// change state, and only from recording back to plain streaming.
    fn tick(&mut self) {
        debug_assert!(self.streaming, "ticks are only scheduled while streaming");

        let outcome = self.run_stages();
        if let Err(message) = outcome {
            log::warn!("{}", message);
        }

        self.next_tick = Some(Instant::now() + self.interval);
    }

    fn run_stages(&mut self) -> Result<(), String> {
        let bytes = self.source.fetch().map_err(|e| {
            self.fetch_failures += 1;
            format!("snapshot fetch failed, skipping tick: {}", e)
        })?;

        let frame = decode(&bytes).map_err(|e| {
            self.decode_failures += 1;
            format!("snapshot decode failed, skipping tick: {}", e)
        })?;
        self.last_dims = Some(frame.dimensions());

        let detections = match self.engine.detect(&frame, self.confidence_threshold) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("inference failed, rendering without detections: {}", e);
                Vec::new()
            }
        };
        self.target_offset_x = center_offset(
            frame.width(),
            &detections,
            self.annotator.class_of_interest(),
        );

        let frame = self.annotator.annotate(frame, &detections);
        self.sink.present(&frame);
        self.frames_rendered += 1;

        if let Some(session) = self.recording.as_mut() {
            match session.write(&frame) {
                Ok(()) => self.frames_recorded += 1,
                Err(e) => {
                    // Fatal to the session, not to the stream.
                    log::error!("recording failed, closing session: {}", e);
                    self.last_error = Some(e.to_string());
                    self.close_recording();
                }
            }
        }
        Ok(())
    }

    fn state(&self) -> PipelineState {
        match (self.streaming, self.recording.is_some()) {
            (false, _) => PipelineState::Idle,
            (true, false) => PipelineState::Streaming,
            (true, true) => PipelineState::StreamingAndRecording,
        }
    }

    fn push_status(&self) {
        let mut status = self.status.lock().expect("status lock");
        *status = StreamStatus {
            state: self.state(),
            frame_rate: self.frame_rate,
            backend: self.engine.kind(),
            frames_rendered: self.frames_rendered,
            frames_recorded: self.frames_recorded,
            fetch_failures: self.fetch_failures,
            decode_failures: self.decode_failures,
            last_recording: self.last_recording.clone(),
            last_error: self.last_error.clone(),
            target_offset_x: self.target_offset_x,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Annotator;
    use std::time::Duration;

    fn controller_with(
        endpoint: &str,
        frame_rate: u32,
    ) -> (PipelineController, Receiver<Frame>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let source = SnapshotSource::new(endpoint, Duration::from_millis(300)).unwrap();
        let (sink, frames) = ChannelSink::new();
        let controller = PipelineController::spawn(
            SessionConfig {
                frame_rate,
                confidence_threshold: 0.5,
            },
            source,
            DetectionEngine::none(),
            Annotator::default(),
            Recorder::new(dir.path()),
            Box::new(sink),
        );
        (controller, frames, dir)
    }

    #[test]
    fn starts_idle_and_stop_is_a_no_op() {
        let (controller, _frames, _dir) = controller_with("stub://64x48", 30);
        assert_eq!(controller.status().state, PipelineState::Idle);
        controller.stop().unwrap();
        assert_eq!(controller.status().state, PipelineState::Idle);
    }

    #[test]
    fn start_transitions_to_streaming_and_is_idempotent() {
        let (controller, frames, _dir) = controller_with("stub://64x48", 30);
        controller.start().unwrap();
        controller.start().unwrap();
        let frame = frames.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.dimensions(), (64, 48));
        assert_eq!(controller.status().state, PipelineState::Streaming);
        controller.stop().unwrap();
        assert_eq!(controller.status().state, PipelineState::Idle);
    }

    #[test]
    fn begin_recording_without_a_frame_is_refused() {
        // Nothing listens on port 9; every fetch fails, so no decoded
        // frame ever exists.
        let (controller, _frames, _dir) = controller_with("http://127.0.0.1:9/cam-hi.jpg", 30);
        controller.start().unwrap();
        let err = controller.begin_recording().unwrap_err();
        assert!(matches!(err, ControlError::NoFrameAvailable));
        assert_eq!(controller.status().state, PipelineState::Streaming);
        controller.stop().unwrap();
    }

    #[test]
    fn begin_recording_while_idle_is_refused() {
        let (controller, _frames, _dir) = controller_with("stub://64x48", 30);
        let err = controller.begin_recording().unwrap_err();
        assert!(matches!(err, ControlError::NotStreaming));
    }

    #[test]
    fn frame_rate_is_validated_at_the_control_surface() {
        let (controller, _frames, _dir) = controller_with("stub://64x48", 30);
        assert!(matches!(
            controller.set_frame_rate(0),
            Err(ControlError::InvalidFrameRate(0))
        ));
        assert!(matches!(
            controller.set_frame_rate(61),
            Err(ControlError::InvalidFrameRate(61))
        ));
        controller.set_frame_rate(5).unwrap();
        assert_eq!(controller.status().frame_rate, 5);
    }

    #[test]
    fn stop_closes_an_open_recording() {
        let (controller, frames, dir) = controller_with("stub://64x48", 30);
        controller.start().unwrap();
        frames.recv_timeout(Duration::from_secs(2)).unwrap();

        let path = controller.begin_recording().unwrap();
        assert_eq!(
            controller.status().state,
            PipelineState::StreamingAndRecording
        );
        controller.stop().unwrap();
        assert_eq!(controller.status().state, PipelineState::Idle);

        // The file is finalized: RIFF size matches the bytes on disk.
        let bytes = std::fs::read(&path).unwrap();
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(riff_size as usize, bytes.len() - 8);
        drop(dir);
    }

    #[test]
    fn end_recording_returns_to_streaming() {
        let (controller, frames, _dir) = controller_with("stub://64x48", 30);
        controller.start().unwrap();
        frames.recv_timeout(Duration::from_secs(2)).unwrap();

        controller.begin_recording().unwrap();
        controller.end_recording().unwrap();
        assert_eq!(controller.status().state, PipelineState::Streaming);
        // A second end_recording is a no-op.
        controller.end_recording().unwrap();
        controller.stop().unwrap();
    }
}
