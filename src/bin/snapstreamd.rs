//! snapstreamd - snapshot-camera streaming daemon
//!
//! This daemon:
//! 1. Polls the configured snapshot endpoint on a timer
//! 2. Decodes frames and runs the configured detection backend
//! 3. Annotates and hands frames to a logging render sink
//! 4. Optionally records the annotated stream to an AVI file
//! 5. Stops cleanly on Ctrl-C, closing any open recording

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use snapstream::{
    Annotator, AnnotatorConfig, ControlError, DetectionEngine, Frame, PipelineController,
    Recorder, RenderSink, SessionConfig, SnapshotSource, SnapstreamConfig,
};

#[derive(Parser, Debug)]
#[command(name = "snapstreamd", about = "Snapshot-camera streaming daemon")]
struct Args {
    /// Snapshot endpoint, e.g. http://192.168.137.76/cam-hi.jpg
    #[arg(long, env = "SNAPSTREAM_ENDPOINT")]
    endpoint: Option<String>,

    /// Target frame rate (1-60)
    #[arg(long)]
    frame_rate: Option<u32>,

    /// Begin recording as soon as the first frame has been decoded
    #[arg(long)]
    record: bool,
}

/// Render sink for headless operation: counts frames and logs a line now
/// and then.
struct LogSink {
    frames: u64,
}

impl RenderSink for LogSink {
    fn present(&mut self, frame: &Frame) {
        self.frames += 1;
        if self.frames % 100 == 1 {
            log::debug!(
                "frame #{}: {}x{}",
                self.frames,
                frame.width(),
                frame.height()
            );
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = SnapstreamConfig::load()?;
    if let Some(endpoint) = args.endpoint {
        cfg.endpoint = endpoint;
    }
    if let Some(rate) = args.frame_rate {
        cfg.frame_rate = rate;
    }

    let source = SnapshotSource::new(&cfg.endpoint, cfg.fetch_timeout)
        .context("configure snapshot source")?;
    // A model-load failure surfaces here, before any ticking begins.
    let engine = DetectionEngine::from_settings(&cfg.detector).context("load detection model")?;
    let annotator = Annotator::new(AnnotatorConfig {
        class_of_interest: cfg.class_of_interest.clone(),
    });
    let recorder = Recorder::new(&cfg.output_dir);

    log::info!(
        "snapstreamd: endpoint={} backend={} frame_rate={}",
        cfg.endpoint,
        engine.kind(),
        cfg.frame_rate
    );

    let controller = PipelineController::spawn(
        SessionConfig {
            frame_rate: cfg.frame_rate,
            confidence_threshold: cfg.detector.confidence_threshold,
        },
        source,
        engine,
        annotator,
        recorder,
        Box::new(LogSink { frames: 0 }),
    );

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .context("install ctrl-c handler")?;

    controller.start().context("start streaming")?;

    let mut want_recording = args.record;
    let mut last_status_log = Instant::now();
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));

        if want_recording {
            match controller.begin_recording() {
                Ok(path) => {
                    log::info!("recording to {}", path.display());
                    want_recording = false;
                }
                // No decoded frame yet; try again next pass.
                Err(ControlError::NoFrameAvailable) => {}
                Err(e) => {
                    log::error!("could not begin recording: {}", e);
                    want_recording = false;
                }
            }
        }

        if last_status_log.elapsed() >= Duration::from_secs(5) {
            let status = controller.status();
            log::info!(
                "state={:?} rendered={} recorded={} fetch_failures={} decode_failures={} offset_x={:?}",
                status.state,
                status.frames_rendered,
                status.frames_recorded,
                status.fetch_failures,
                status.decode_failures,
                status.target_offset_x,
            );
            last_status_log = Instant::now();
        }
    }

    controller.stop().context("stop streaming")?;
    let status = controller.status();
    log::info!(
        "shutting down: {} frames rendered, {} recorded",
        status.frames_rendered,
        status.frames_recorded
    );
    Ok(())
}
