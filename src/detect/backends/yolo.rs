//! YOLO-family ONNX backend.
//!
//! Expects the single-output layout of YOLOv8-style exports:
//! `[1, 4 + C, N]` where the first four rows are box center/size in model
//! input pixels and the remaining `C` rows are per-class scores. Class
//! indices are 0-based and resolve directly against the model's own label
//! table.

use std::path::Path;

use anyhow::{Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, Preprocess};
use crate::detect::labels::COCO_CLASSES;
use crate::detect::result::{BoundingBox, Detection};
use crate::error::ModelLoadError;
use crate::frame::Frame;

const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

#[derive(Debug)]
pub struct YoloBackend {
    plan: TypedSimplePlan<TypedModel>,
    preprocess: Preprocess,
    labels: Vec<String>,
    iou_threshold: f32,
}

impl YoloBackend {
    /// Load a YOLO ONNX model and prepare it for inference.
    pub fn load(model_path: &Path, preprocess: Preprocess) -> Result<Self, ModelLoadError> {
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
            labels: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }
}

impl DetectorBackend for YoloBackend {
    fn name(&self) -> &'static str {
        "yolo"
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>> {
        let input = self.preprocess.to_tensor(frame);
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .context("yolo inference failed")?;
        let output = outputs
            .first()
            .context("yolo model produced no outputs")?
            .to_array_view::<f32>()
            .context("yolo output tensor was not f32")?;

        Ok(decode_output(
            &output,
            frame.dimensions(),
            (self.preprocess.width, self.preprocess.height),
            confidence_threshold,
            self.iou_threshold,
            &self.labels,
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

#[derive(Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
    class: usize,
}

impl Candidate {
    fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let area_a = (self.x2 - self.x1) * (self.y2 - self.y1);
        let area_b = (other.x2 - other.x1) * (other.y2 - other.y1);
        inter / (area_a + area_b - inter)
    }
}

/// Decode a `[1, 4 + C, N]` output into frame-space detections.
fn decode_output(
    output: &tract_ndarray::ArrayViewD<f32>,
    frame_dims: (u32, u32),
    input_dims: (u32, u32),
    confidence_threshold: f32,
    iou_threshold: f32,
    labels: &[String],
) -> Vec<Detection> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] <= 4 {
        log::warn!("unexpected yolo output shape {:?}", shape);
        return Vec::new();
    }
    let class_count = (shape[1] - 4).min(labels.len());
    let anchors = shape[2];

    let scale_x = frame_dims.0 as f32 / input_dims.0 as f32;
    let scale_y = frame_dims.1 as f32 / input_dims.1 as f32;

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = 0.0f32;
        for class in 0..class_count {
            let score = output[[0, 4 + class, anchor]];
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if best_score < confidence_threshold {
            continue;
        }

        let cx = output[[0, 0, anchor]] * scale_x;
        let cy = output[[0, 1, anchor]] * scale_y;
        let w = output[[0, 2, anchor]] * scale_x;
        let h = output[[0, 3, anchor]] * scale_y;
        candidates.push(Candidate {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            confidence: best_score,
            class: best_class,
        });
    }

    let kept = nms(candidates, iou_threshold);
    kept.into_iter()
        .map(|c| to_detection(&c, frame_dims, labels))
        .collect()
}

/// Greedy per-class NMS: sort by confidence descending, suppress
/// same-class boxes that overlap a kept box.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_unstable_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Candidate> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];
    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(candidates[i]);
        for j in (i + 1)..candidates.len() {
            if candidates[j].class == candidates[i].class
                && candidates[i].iou(&candidates[j]) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }
    kept
}

fn to_detection(candidate: &Candidate, frame_dims: (u32, u32), labels: &[String]) -> Detection {
    let (fw, fh) = (frame_dims.0 as f32, frame_dims.1 as f32);
    let x1 = candidate.x1.clamp(0.0, fw);
    let y1 = candidate.y1.clamp(0.0, fh);
    let x2 = candidate.x2.clamp(0.0, fw);
    let y2 = candidate.y2.clamp(0.0, fh);
    Detection {
        label: labels[candidate.class].clone(),
        confidence: candidate.confidence,
        bbox: BoundingBox {
            x: x1 as i32,
            y: y1 as i32,
            width: (x2 - x1).max(0.0) as u32,
            height: (y2 - y1).max(0.0) as u32,
        },
    }
}
