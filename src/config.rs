//! Daemon configuration.
//!
//! Defaults, overridden by an optional JSON config file named by
//! `SNAPSTREAM_CONFIG`, overridden by `SNAPSTREAM_*` environment
//! variables, then validated.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::BackendKind;

const DEFAULT_ENDPOINT: &str = "http://192.168.137.76/cam-hi.jpg";
const DEFAULT_FRAME_RATE: u32 = 30;
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_INPUT_SIZE: u32 = 320;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_CLASS_OF_INTEREST: &str = "person";
const DEFAULT_OUTPUT_DIR: &str = ".";

pub const MIN_FRAME_RATE: u32 = 1;
pub const MAX_FRAME_RATE: u32 = 60;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    endpoint: Option<String>,
    frame_rate: Option<u32>,
    fetch_timeout_ms: Option<u64>,
    detector: Option<DetectorConfigFile>,
    class_of_interest: Option<String>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model: Option<PathBuf>,
    class_list: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct SnapstreamConfig {
    pub endpoint: String,
    pub frame_rate: u32,
    pub fetch_timeout: Duration,
    pub detector: DetectorSettings,
    pub class_of_interest: String,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: BackendKind,
    pub model_path: PathBuf,
    pub class_list_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::None,
            model_path: PathBuf::new(),
            class_list_path: PathBuf::new(),
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl SnapstreamConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SNAPSTREAM_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Result<Self> {
        let endpoint = file
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let frame_rate = file.frame_rate.unwrap_or(DEFAULT_FRAME_RATE);
        let fetch_timeout =
            Duration::from_millis(file.fetch_timeout_ms.unwrap_or(DEFAULT_FETCH_TIMEOUT_MS));
        let detector_file = file.detector.unwrap_or_default();
        let backend = match detector_file.backend.as_deref() {
            Some(name) => name.parse::<BackendKind>().map_err(|e| anyhow!(e))?,
            None => BackendKind::None,
        };
        let detector = DetectorSettings {
            backend,
            model_path: detector_file.model.unwrap_or_default(),
            class_list_path: detector_file.class_list.unwrap_or_default(),
            input_width: detector_file.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
            input_height: detector_file.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
        };
        Ok(Self {
            endpoint,
            frame_rate,
            fetch_timeout,
            detector,
            class_of_interest: file
                .class_of_interest
                .unwrap_or_else(|| DEFAULT_CLASS_OF_INTEREST.to_string()),
            output_dir: file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(endpoint) = std::env::var("SNAPSTREAM_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint;
            }
        }
        if let Ok(rate) = std::env::var("SNAPSTREAM_FRAME_RATE") {
            let rate: u32 = rate
                .parse()
                .map_err(|_| anyhow!("SNAPSTREAM_FRAME_RATE must be an integer"))?;
            self.frame_rate = rate;
        }
        if let Ok(backend) = std::env::var("SNAPSTREAM_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.parse::<BackendKind>().map_err(|e| anyhow!(e))?;
            }
        }
        if let Ok(model) = std::env::var("SNAPSTREAM_MODEL") {
            if !model.trim().is_empty() {
                self.detector.model_path = PathBuf::from(model);
            }
        }
        if let Ok(class_list) = std::env::var("SNAPSTREAM_CLASS_LIST") {
            if !class_list.trim().is_empty() {
                self.detector.class_list_path = PathBuf::from(class_list);
            }
        }
        if let Ok(dir) = std::env::var("SNAPSTREAM_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&self.frame_rate) {
            return Err(anyhow!(
                "frame_rate must be within {}..={}, got {}",
                MIN_FRAME_RATE,
                MAX_FRAME_RATE,
                self.frame_rate
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within 0.0..=1.0"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input dimensions must be non-zero"));
        }
        match self.detector.backend {
            BackendKind::None => {}
            BackendKind::Yolo => {
                if self.detector.model_path.as_os_str().is_empty() {
                    return Err(anyhow!("yolo backend requires detector.model"));
                }
            }
            BackendKind::Ssd => {
                if self.detector.model_path.as_os_str().is_empty() {
                    return Err(anyhow!("ssd backend requires detector.model"));
                }
                if self.detector.class_list_path.as_os_str().is_empty() {
                    return Err(anyhow!("ssd backend requires detector.class_list"));
                }
            }
        }
        if self.class_of_interest.trim().is_empty() {
            return Err(anyhow!("class_of_interest must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
