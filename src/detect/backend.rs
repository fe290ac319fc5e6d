//! Detector backend contract and shared preprocessing.

use anyhow::Result;
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// `detect` receives the full-resolution frame and a confidence cutoff and
/// returns detections in frame pixel coordinates, ordered by descending
/// confidence, already filtered against the cutoff. Implementations must
/// treat the frame as read-only and must not retain it across calls.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>>;
}

/// Fixed input preparation a model expects, applied identically to every
/// frame before inference: resize to the model resolution, subtract a
/// per-channel mean, scale, optionally swap the red/blue channels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Preprocess {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub mean: [f32; 3],
    pub swap_rb: bool,
}

impl Preprocess {
    /// YOLO-family convention: plain 1/255 scaling, RGB order.
    pub fn yolo(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scale: 1.0 / 255.0,
            mean: [0.0; 3],
            swap_rb: false,
        }
    }

    /// SSD MobileNet convention: [-1, 1] normalization with a 127.5 mean
    /// and a red/blue swap, matching the exported model's expectations.
    pub fn ssd(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scale: 1.0 / 127.5,
            mean: [127.5; 3],
            swap_rb: true,
        }
    }

    /// Resize and normalize a frame into an NCHW f32 tensor.
    pub fn to_tensor(&self, frame: &Frame) -> Tensor {
        let resized = if frame.dimensions() == (self.width, self.height) {
            frame.clone().into_rgb_image()
        } else {
            imageops::resize(
                &frame.clone().into_rgb_image(),
                self.width,
                self.height,
                FilterType::Triangle,
            )
        };

        let (scale, mean, swap) = (self.scale, self.mean, self.swap_rb);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| {
                let source_channel = if swap { 2 - channel } else { channel };
                let value = resized.get_pixel(x as u32, y as u32)[source_channel] as f32;
                (value - mean[channel]) * scale
            },
        );

        input.into_tensor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_shape_and_normalization() {
        let frame = Frame::filled(8, 6, [255, 0, 127]);
        let pre = Preprocess::yolo(4, 4);
        let tensor = pre.to_tensor(&frame);
        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);

        let view = tensor.to_array_view::<f32>().unwrap();
        // Solid color survives resizing; red channel is 255 * 1/255.
        assert!((view[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(view[[0, 1, 0, 0]].abs() < 1e-6);
    }

    #[test]
    fn swap_rb_moves_red_into_last_channel() {
        let frame = Frame::filled(4, 4, [200, 10, 40]);
        let pre = Preprocess::ssd(4, 4);
        let tensor = pre.to_tensor(&frame);
        let view = tensor.to_array_view::<f32>().unwrap();
        // Channel 0 now samples blue (40), channel 2 samples red (200).
        assert!((view[[0, 0, 0, 0]] - (40.0 - 127.5) / 127.5).abs() < 1e-6);
        assert!((view[[0, 2, 0, 0]] - (200.0 - 127.5) / 127.5).abs() < 1e-6);
    }
}
