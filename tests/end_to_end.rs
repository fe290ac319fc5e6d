//! End-to-end runs against a local HTTP snapshot endpoint.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use snapstream::{
    Annotator, ChannelSink, DetectionEngine, Frame, PipelineController, PipelineState, Recorder,
    SessionConfig, SnapshotSource,
};

fn jpeg_frame(width: u32, height: u32) -> Vec<u8> {
    let frame = Frame::filled(width, height, [40, 60, 80]);
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, 90)
        .encode(
            frame.data(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
    bytes
}

/// One-request-per-connection snapshot server. The first `fail_first`
/// requests answer 500; everything after serves the JPEG.
fn spawn_server(jpeg: Vec<u8>, fail_first: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut request = [0u8; 2048];
            let _ = stream.read(&mut request);
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < fail_first {
                let _ = stream.write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                );
            } else {
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    jpeg.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&jpeg);
            }
        }
    });
    (format!("http://{}/cam-hi.jpg", addr), requests)
}

fn controller_for(
    endpoint: &str,
    frame_rate: u32,
) -> (
    PipelineController,
    std::sync::mpsc::Receiver<Frame>,
    tempfile::TempDir,
) {
    let dir = tempfile::tempdir().unwrap();
    let source = SnapshotSource::new(endpoint, Duration::from_secs(2)).unwrap();
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
fn streams_annotates_and_records_a_healthy_endpoint() {
    let (endpoint, _requests) = spawn_server(jpeg_frame(640, 480), 0);
    let (controller, frames, dir) = controller_for(&endpoint, 20);

    controller.start().unwrap();
    let first = frames.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.dimensions(), (640, 480));

    // No detections means no box pixels; the only overlay is the red
    // "Not detected" summary.
    let green = first
        .data()
        .chunks_exact(3)
        .filter(|px| px == &[0, 255, 0])
        .count();
    assert_eq!(green, 0, "NoDetection must draw zero rectangles");

    let path = controller.begin_recording().unwrap();
    assert_eq!(
        controller.status().state,
        PipelineState::StreamingAndRecording
    );
    std::thread::sleep(Duration::from_millis(400));
    controller.stop().unwrap();
    assert_eq!(controller.status().state, PipelineState::Idle);

    let recorded = controller.status().frames_recorded;
    assert!(recorded >= 1);

    // The closed file is a readable AVI whose header agrees with the
    // ticks spent recording.
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"AVI ");
    let total_frames = u32::from_le_bytes(bytes[48..52].try_into().unwrap());
    assert_eq!(u64::from(total_frames), recorded);
    let width = u32::from_le_bytes(bytes[64..68].try_into().unwrap());
    let height = u32::from_le_bytes(bytes[68..72].try_into().unwrap());
    assert_eq!((width, height), (640, 480));

    let idx_pos = bytes
        .windows(4)
        .rposition(|w| w == b"idx1")
        .expect("finalized file carries an index");
    let idx_len = u32::from_le_bytes(bytes[idx_pos + 4..idx_pos + 8].try_into().unwrap());
    assert_eq!(u64::from(idx_len / 16), recorded);
    drop(dir);
}

#[test]
fn http_500_skips_ticks_and_recovers_without_leaving_streaming() {
    let (endpoint, requests) = spawn_server(jpeg_frame(320, 240), 3);
    let (controller, frames, _dir) = controller_for(&endpoint, 30);

    controller.start().unwrap();
    // The sink stays silent through the three failing polls and delivers
    // on the fourth.
    let first = frames.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first.dimensions(), (320, 240));

    let status = controller.status();
    assert_eq!(status.state, PipelineState::Streaming);
    assert_eq!(status.fetch_failures, 3);
    assert!(status.frames_rendered >= 1);
    assert!(requests.load(Ordering::SeqCst) >= 4);

    controller.stop().unwrap();
}
