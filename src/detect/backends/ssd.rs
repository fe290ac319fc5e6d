//! SSD-family ONNX backend.
//!
//! Expects the `DetectionOutput` layout of SSD exports: `[1, 1, N, 7]`
//! rows of `[image_id, class_id, score, x1, y1, x2, y2]` with corners
//! normalized to [0, 1]. Class ids are 1-based and resolve through an
//! externally supplied class-name list at `class_id - 1`.

use std::path::Path;

use anyhow::{Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, Preprocess};
use crate::detect::labels::load_class_list;
use crate::detect::result::{BoundingBox, Detection};
use crate::error::ModelLoadError;
use crate::frame::Frame;

#[derive(Debug)]
pub struct SsdBackend {
    plan: TypedSimplePlan<TypedModel>,
    preprocess: Preprocess,
    class_names: Vec<String>,
}

impl SsdBackend {
    /// Load an SSD ONNX model plus its class-name list.
    pub fn load(
        model_path: &Path,
        class_list_path: &Path,
        preprocess: Preprocess,
    ) -> Result<Self, ModelLoadError> {
        let class_names = load_class_list(class_list_path)?;
        if !model_path.is_file() {
            return Err(ModelLoadError::FileNotFound(model_path.to_path_buf()));
        }
        let plan = build_plan(model_path, preprocess.width, preprocess.height).map_err(|e| {
            ModelLoadError::IncompatibleFormat {
                path: model_path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            plan,
            preprocess,
            class_names,
        })
    }
}

impl DetectorBackend for SsdBackend {
    fn name(&self) -> &'static str {
        "ssd"
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>> {
        let input = self.preprocess.to_tensor(frame);
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("ssd inference failed")?;
        let output = outputs
            .first()
            .context("ssd model produced no outputs")?
            .to_array_view::<f32>()
            .context("ssd output tensor was not f32")?;

        Ok(decode_output(
            &output,
            frame.dimensions(),
            confidence_threshold,
            &self.class_names,
        ))
    }
}

fn build_plan(path: &Path, width: u32, height: u32) -> TractResult<TypedSimplePlan<TypedModel>> {
    tract_onnx::onnx()
        .model_for_path(path)?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, height as usize, width as usize),
            ),
        )?
        .into_optimized()?
        .into_runnable()
}

/// Decode a `[1, 1, N, 7]` DetectionOutput tensor into frame-space
/// detections, ordered by descending confidence.
fn decode_output(
    output: &tract_ndarray::ArrayViewD<f32>,
    frame_dims: (u32, u32),
    confidence_threshold: f32,
    class_names: &[String],
) -> Vec<Detection> {
    let shape = output.shape();
    if shape.len() != 4 || shape[3] != 7 {
        log::warn!("unexpected ssd output shape {:?}", shape);
        return Vec::new();
    }

    let (fw, fh) = (frame_dims.0 as f32, frame_dims.1 as f32);
    let mut detections = Vec::new();
    for row in 0..shape[2] {
        let score = output[[0, 0, row, 2]];
        if score < confidence_threshold {
            continue;
        }

        // Class ids are 1-based in this export family; 0 is background.
        let class_id = output[[0, 0, row, 1]] as i64;
        if class_id < 1 {
            continue;
        }
        let Some(label) = class_names.get(class_id as usize - 1) else {
            log::warn!(
                "ssd reported class id {} outside the {}-entry class list",
                class_id,
                class_names.len()
            );
            continue;
        };

        let x1 = (output[[0, 0, row, 3]] * fw).clamp(0.0, fw);
        let y1 = (output[[0, 0, row, 4]] * fh).clamp(0.0, fh);
        let x2 = (output[[0, 0, row, 5]] * fw).clamp(0.0, fw);
        let y2 = (output[[0, 0, row, 6]] * fh).clamp(0.0, fh);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(Detection {
            label: label.clone(),
            confidence: score,
            bbox: BoundingBox {
                x: x1 as i32,
                y: y1 as i32,
                width: (x2 - x1) as u32,
                height: (y2 - y1) as u32,
            },
        });
    }

    detections.sort_unstable_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    detections
}
