use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Pass-through backend: no model, no detections, no cost.
#[derive(Default)]
pub struct NoneBackend;

impl NoneBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for NoneBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn detect(&mut self, _frame: &Frame, _confidence_threshold: f32) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_empty_for_any_threshold() {
        let mut backend = NoneBackend::new();
        let frame = Frame::filled(16, 16, [128, 128, 128]);
        for threshold in [0.0, 0.5, 1.0] {
            assert!(backend.detect(&frame, threshold).unwrap().is_empty());
        }
    }
}
