//! Snapshot acquisition.
//!
//! `SnapshotSource` fetches one encoded still image per call from a
//! configured endpoint. Supported schemes:
//! - `http://` / `https://`: a plain GET per poll, each request independent
//! - `stub://WIDTHxHEIGHT`: synthesizes a JPEG in memory (tests, demos)
//!
//! The source is responsible for:
//! - Validating the endpoint URL at construction
//! - Bounding response bodies to `MAX_SNAPSHOT_BYTES`
//! - Classifying transport failures into [`FetchError`]
//!
//! It never decodes pixels; that is `decode`'s job.

use std::error::Error as StdError;
use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::error::FetchError;
use crate::frame::Frame;

/// Upper bound on a single snapshot body.
pub const MAX_SNAPSHOT_BYTES: usize = 5 * 1024 * 1024;

const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;
const UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// One-snapshot-per-call frame source.
pub struct SnapshotSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Http(HttpSnapshotSource),
    Stub(StubSnapshotSource),
}

impl SnapshotSource {
    /// Build a source for `endpoint`. Fails on anything that is not a
    /// syntactically valid `http(s)://` or `stub://` URL.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(endpoint).context("parse snapshot endpoint url")?;
        let backend = match url.scheme() {
            "http" | "https" => SourceBackend::Http(HttpSnapshotSource::new(endpoint, timeout)),
            "stub" => SourceBackend::Stub(StubSnapshotSource::new(endpoint, &url)?),
            other => {
                return Err(anyhow!(
                    "unsupported snapshot scheme '{}'; expected http(s) or stub",
                    other
                ))
            }
        };
        Ok(Self { backend })
    }

    /// Fetch one encoded snapshot.
    pub fn fetch(&mut self) -> Result<Vec<u8>, FetchError> {
        match &mut self.backend {
            SourceBackend::Http(source) => source.fetch(),
            SourceBackend::Stub(source) => source.fetch(),
        }
    }

    /// False once several consecutive fetches have failed.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            SourceBackend::Http(source) => source.consecutive_failures < UNHEALTHY_AFTER_FAILURES,
            SourceBackend::Stub(_) => true,
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Http(source) => SourceStats {
                snapshots_fetched: source.fetch_count,
                endpoint: source.endpoint.clone(),
            },
            SourceBackend::Stub(source) => SourceStats {
                snapshots_fetched: source.fetch_count,
                endpoint: source.endpoint.clone(),
            },
        }
    }
}

/// Statistics for a snapshot source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub snapshots_fetched: u64,
    pub endpoint: String,
}

struct HttpSnapshotSource {
    endpoint: String,
    agent: ureq::Agent,
    fetch_count: u64,
    consecutive_failures: u32,
}

impl HttpSnapshotSource {
    fn new(endpoint: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self {
            endpoint: endpoint.to_string(),
            agent,
            fetch_count: 0,
            consecutive_failures: 0,
        }
    }

    fn fetch(&mut self) -> Result<Vec<u8>, FetchError> {
        let result = self.fetch_inner();
        match &result {
            Ok(_) => {
                self.fetch_count += 1;
                self.consecutive_failures = 0;
            }
            Err(_) => self.consecutive_failures += 1,
        }
        result
    }

    fn fetch_inner(&self) -> Result<Vec<u8>, FetchError> {
        let response = self
            .agent
            .get(&self.endpoint)
            .call()
            .map_err(classify_ureq_error)?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_SNAPSHOT_BYTES as u64)
            .read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }
        Ok(bytes)
    }
}

fn classify_ureq_error(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Status(code, _) => FetchError::Status(code),
        ureq::Error::Transport(transport) => {
            // Walk the source chain looking for the underlying io error;
            // ureq wraps it at varying depths.
            let mut source: Option<&dyn StdError> = transport.source();
            while let Some(inner) = source {
                if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                    match io.kind() {
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                            return FetchError::Timeout
                        }
                        std::io::ErrorKind::ConnectionRefused => {
                            return FetchError::ConnectionRefused
                        }
                        _ => break,
                    }
                }
                source = inner.source();
            }
            match transport.kind() {
                ureq::ErrorKind::ConnectionFailed => FetchError::ConnectionRefused,
                _ => FetchError::Transport(transport.to_string()),
            }
        }
    }
}

struct StubSnapshotSource {
    endpoint: String,
    width: u32,
    height: u32,
    fetch_count: u64,
}

impl StubSnapshotSource {
    fn new(endpoint: &str, url: &Url) -> Result<Self> {
        let (width, height) = match url.host_str() {
            Some(dims) => parse_dimensions(dims)
                .ok_or_else(|| anyhow!("stub endpoint expects stub://WIDTHxHEIGHT, got '{}'", dims))?,
            None => (DEFAULT_STUB_WIDTH, DEFAULT_STUB_HEIGHT),
        };
        Ok(Self {
            endpoint: endpoint.to_string(),
            width,
            height,
            fetch_count: 0,
        })
    }

    fn fetch(&mut self) -> Result<Vec<u8>, FetchError> {
        self.fetch_count += 1;
        let frame = synthetic_frame(self.width, self.height, self.fetch_count);
        let mut bytes = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, 85)
            .encode(
                frame.data(),
                frame.width(),
                frame.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes)
    }
}

fn parse_dimensions(dims: &str) -> Option<(u32, u32)> {
    let (w, h) = dims.split_once('x')?;
    let width = w.parse().ok()?;
    let height = h.parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Deterministic moving gradient; varies per tick so downstream stages see
/// changing content.
fn synthetic_frame(width: u32, height: u32, tick: u64) -> Frame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push(((x as u64 + tick) % 256) as u8);
            data.push((y % 256) as u8);
            data.push(((x as u64 + y as u64 + tick) % 256) as u8);
        }
    }
    Frame::from_raw(width, height, data).expect("synthetic buffer length")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_url_endpoints() {
        assert!(SnapshotSource::new("not a url", Duration::from_secs(1)).is_err());
        assert!(SnapshotSource::new("ftp://camera/cam.jpg", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn stub_source_serves_decodable_jpegs() {
        let mut source = SnapshotSource::new("stub://320x240", Duration::from_secs(1)).unwrap();
        let bytes = source.fetch().expect("stub fetch");
        let frame = crate::decode::decode(&bytes).expect("stub jpeg decodes");
        assert_eq!(frame.dimensions(), (320, 240));
        assert_eq!(source.stats().snapshots_fetched, 1);
        assert!(source.is_healthy());
    }

    #[test]
    fn stub_dimensions_must_be_well_formed() {
        assert!(SnapshotSource::new("stub://640x", Duration::from_secs(1)).is_err());
        assert!(SnapshotSource::new("stub://0x480", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn connection_refused_maps_to_fetch_error() {
        // Port 1 on localhost is essentially never listening.
        let mut source =
            SnapshotSource::new("http://127.0.0.1:1/cam-hi.jpg", Duration::from_millis(500))
                .unwrap();
        match source.fetch() {
            Err(FetchError::ConnectionRefused) | Err(FetchError::Transport(_)) => {}
            other => panic!("expected a transport-level failure, got {:?}", other.map(|b| b.len())),
        }
    }
}
