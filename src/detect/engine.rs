//! Backend selection and dispatch.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;

use crate::config::DetectorSettings;
use crate::detect::backend::{DetectorBackend, Preprocess};
use crate::detect::backends::{NoneBackend, SsdBackend, YoloBackend};
use crate::detect::result::Detection;
use crate::error::ModelLoadError;
use crate::frame::Frame;

/// Which detection backend a session runs. Fixed for the session's
/// lifetime; there is no hot-swap mid-stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    None,
    Yolo,
    Ssd,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "yolo" => Ok(Self::Yolo),
            "ssd" => Ok(Self::Ssd),
            other => Err(format!(
                "unknown detection backend '{}'; expected none, yolo, or ssd",
                other
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Yolo => "yolo",
            Self::Ssd => "ssd",
        };
        f.write_str(name)
    }
}

/// The closed set of detection backends.
pub enum DetectionEngine {
    None(NoneBackend),
    Yolo(YoloBackend),
    Ssd(SsdBackend),
}

impl DetectionEngine {
    pub fn none() -> Self {
        Self::None(NoneBackend::new())
    }

    /// Build the engine a settings block describes. Model loading happens
    /// here, once, before any streaming can begin; a failure prevents the
    /// pipeline from ever entering the streaming state.
    pub fn from_settings(settings: &DetectorSettings) -> Result<Self, ModelLoadError> {
        let input = (settings.input_width, settings.input_height);
        match settings.backend {
            BackendKind::None => Ok(Self::none()),
            BackendKind::Yolo => {
                let backend =
                    YoloBackend::load(&settings.model_path, Preprocess::yolo(input.0, input.1))?;
                Ok(Self::Yolo(backend))
            }
            BackendKind::Ssd => {
                let backend = SsdBackend::load(
                    &settings.model_path,
                    &settings.class_list_path,
                    Preprocess::ssd(input.0, input.1),
                )?;
                Ok(Self::Ssd(backend))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::None(_) => BackendKind::None,
            Self::Yolo(_) => BackendKind::Yolo,
            Self::Ssd(_) => BackendKind::Ssd,
        }
    }

    /// Run the active backend on a frame.
    pub fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>> {
        match self {
            Self::None(backend) => backend.detect(frame, confidence_threshold),
            Self::Yolo(backend) => backend.detect(frame, confidence_threshold),
            Self::Ssd(backend) => backend.detect(frame, confidence_threshold),
        }
    }
}
