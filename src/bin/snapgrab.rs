//! snapgrab - one-shot snapshot tool
//!
//! Fetches a single snapshot from the endpoint, runs the configured
//! detection backend over it, and writes the annotated image to disk.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use snapstream::config::DetectorSettings;
use snapstream::detect::BackendKind;
use snapstream::{decode, Annotator, AnnotatorConfig, DetectionEngine, SnapshotSource};

#[derive(Parser, Debug)]
#[command(name = "snapgrab", about = "Fetch, detect, annotate one snapshot")]
struct Args {
    /// Snapshot endpoint, e.g. http://192.168.137.76/cam-hi.jpg
    #[arg(env = "SNAPSTREAM_ENDPOINT")]
    endpoint: String,

    /// Output image path
    #[arg(long, default_value = "snapshot.png")]
    output: PathBuf,

    /// Detection backend: none, yolo, or ssd
    #[arg(long, default_value = "none")]
    backend: BackendKind,

    /// ONNX model path (yolo and ssd backends)
    #[arg(long, env = "SNAPSTREAM_MODEL")]
    model: Option<PathBuf>,

    /// Newline-delimited class-name list (ssd backend)
    #[arg(long, env = "SNAPSTREAM_CLASS_LIST")]
    class_list: Option<PathBuf>,

    /// Confidence cutoff in [0, 1]
    #[arg(long, default_value_t = 0.5)]
    confidence: f32,

    /// Label that flips the summary overlay to "Detected"
    #[arg(long, default_value = "person")]
    class_of_interest: String,

    /// Fetch timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = DetectorSettings {
        backend: args.backend,
        model_path: args.model.unwrap_or_default(),
        class_list_path: args.class_list.unwrap_or_default(),
        ..DetectorSettings::default()
    };

    let mut source = SnapshotSource::new(&args.endpoint, Duration::from_millis(args.timeout_ms))
        .context("configure snapshot source")?;
    let mut engine = DetectionEngine::from_settings(&settings).context("load detection model")?;
    let annotator = Annotator::new(AnnotatorConfig {
        class_of_interest: args.class_of_interest,
    });

    let bytes = source.fetch().context("fetch snapshot")?;
    let frame = decode(&bytes).context("decode snapshot")?;
    log::info!(
        "snapshot: {}x{}, {} bytes encoded",
        frame.width(),
        frame.height(),
        bytes.len()
    );

    let detections = engine
        .detect(&frame, args.confidence)
        .context("run detection")?;
    for detection in &detections {
        log::info!(
            "{} {:.2} at ({}, {}) {}x{}",
            detection.label,
            detection.confidence,
            detection.bbox.x,
            detection.bbox.y,
            detection.bbox.width,
            detection.bbox.height
        );
    }

    let annotated = annotator.annotate(frame, &detections);
    annotated
        .into_rgb_image()
        .save(&args.output)
        .with_context(|| format!("write {}", args.output.display()))?;
    log::info!("wrote {}", args.output.display());
    Ok(())
}
