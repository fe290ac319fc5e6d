//! Frame annotation.
//!
//! Draws one hollow rectangle and a label per detection, plus a
//! fixed-position summary line reporting whether the configured class of
//! interest is present. Pure: the same frame and detections always
//! produce the same pixels.

mod font;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::{contains_label, Detection};
use crate::frame::Frame;

pub use font::{draw_text, text_height, text_width};

const DEFAULT_CLASS_OF_INTEREST: &str = "person";
/// Detections and the positive summary state.
const COLOR_POSITIVE: Rgb<u8> = Rgb([0, 255, 0]);
/// The negative summary state.
const COLOR_NEGATIVE: Rgb<u8> = Rgb([255, 0, 0]);
const SUMMARY_POS: (i32, i32) = (10, 10);
const SUMMARY_SCALE: u32 = 2;
const LABEL_SCALE: u32 = 1;
const BOX_THICKNESS: i32 = 2;

#[derive(Clone, Debug)]
pub struct AnnotatorConfig {
    /// Label whose presence flips the summary line to "Detected".
    pub class_of_interest: String,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            class_of_interest: DEFAULT_CLASS_OF_INTEREST.to_string(),
        }
    }
}

pub struct Annotator {
    config: AnnotatorConfig,
}

impl Annotator {
    pub fn new(config: AnnotatorConfig) -> Self {
        Self { config }
    }

    pub fn class_of_interest(&self) -> &str {
        &self.config.class_of_interest
    }

    /// Draw boxes, labels, and the summary line. Consumes and returns the
    /// frame; the buffer is reused, not copied.
    pub fn annotate(&self, frame: Frame, detections: &[Detection]) -> Frame {
        let mut image = frame.into_rgb_image();

        for detection in detections {
            draw_box(&mut image, detection);
            let label = format!(
                "{} ({:.0}%)",
                detection.label,
                detection.confidence * 100.0
            );
            let text_y = detection.bbox.y - (font::text_height(LABEL_SCALE) as i32 + 2);
            draw_text(
                &mut image,
                detection.bbox.x,
                text_y.max(0),
                &label,
                COLOR_POSITIVE,
                LABEL_SCALE,
            );
        }

        let (text, color) = if contains_label(detections, &self.config.class_of_interest) {
            ("Detected", COLOR_POSITIVE)
        } else {
            ("Not detected", COLOR_NEGATIVE)
        };
        draw_text(
            &mut image,
            SUMMARY_POS.0,
            SUMMARY_POS.1,
            text,
            color,
            SUMMARY_SCALE,
        );

        Frame::from_rgb_image(image)
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(AnnotatorConfig::default())
    }
}

fn draw_box(image: &mut RgbImage, detection: &Detection) {
    let bbox = detection.bbox;
    // Nested hollow rects give the outline its thickness.
    for inset in 0..BOX_THICKNESS {
        let width = bbox.width.saturating_sub(2 * inset as u32);
        let height = bbox.height.saturating_sub(2 * inset as u32);
        if width == 0 || height == 0 {
            break;
        }
        let rect = Rect::at(bbox.x + inset, bbox.y + inset).of_size(width, height);
        draw_hollow_rect_mut(image, rect, COLOR_POSITIVE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str, x: i32, y: i32) -> Detection {
        Detection {
            label: label.to_string(),
            confidence: 0.87,
            bbox: BoundingBox {
                x,
                y,
                width: 60,
                height: 40,
            },
        }
    }

    fn count_green(frame: &Frame) -> usize {
        frame
            .data()
            .chunks_exact(3)
            .filter(|px| px == &[0, 255, 0])
            .count()
    }

    fn summary_region_has(frame: &Frame, rgb: [u8; 3]) -> bool {
        let width = text_width("Not detected", SUMMARY_SCALE);
        let height = text_height(SUMMARY_SCALE);
        for y in SUMMARY_POS.1 as u32..SUMMARY_POS.1 as u32 + height {
            for x in SUMMARY_POS.0 as u32..SUMMARY_POS.0 as u32 + width {
                if frame.pixel(x, y) == rgb {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn draws_one_outline_per_detection() {
        let annotator = Annotator::default();
        let detections = vec![det("car", 100, 100), det("car", 300, 200)];
        let frame = annotator.annotate(Frame::filled(640, 480, [0, 0, 0]), &detections);

        for d in &detections {
            // Outline corners are painted.
            assert_eq!(frame.pixel(d.bbox.x as u32, d.bbox.y as u32), [0, 255, 0]);
            assert_eq!(
                frame.pixel(
                    (d.bbox.x + d.bbox.width as i32 - 1) as u32,
                    (d.bbox.y + d.bbox.height as i32 - 1) as u32
                ),
                [0, 255, 0]
            );
            // Interior stays untouched.
            assert_eq!(
                frame.pixel(d.bbox.center_x() as u32, d.bbox.center_y() as u32),
                [0, 0, 0]
            );
        }
    }

    #[test]
    fn no_detections_means_no_box_pixels() {
        let annotator = Annotator::default();
        let frame = annotator.annotate(Frame::filled(640, 480, [0, 0, 0]), &[]);
        // Summary is red here, so any green pixel would be a stray box.
        assert_eq!(count_green(&frame), 0);
        assert!(summary_region_has(&frame, [255, 0, 0]));
    }

    #[test]
    fn summary_flips_on_the_class_of_interest() {
        let annotator = Annotator::default();

        let with_person = annotator.annotate(
            Frame::filled(640, 480, [0, 0, 0]),
            &[det("person", 200, 200)],
        );
        assert!(summary_region_has(&with_person, [0, 255, 0]));
        assert!(!summary_region_has(&with_person, [255, 0, 0]));

        let with_car = annotator.annotate(
            Frame::filled(640, 480, [0, 0, 0]),
            &[det("car", 200, 200)],
        );
        assert!(summary_region_has(&with_car, [255, 0, 0]));
    }

    #[test]
    fn annotation_is_deterministic() {
        let annotator = Annotator::default();
        let detections = vec![det("person", 50, 120)];
        let a = annotator.annotate(Frame::filled(320, 240, [30, 30, 30]), &detections);
        let b = annotator.annotate(Frame::filled(320, 240, [30, 30, 30]), &detections);
        assert_eq!(a, b);
    }

    #[test]
    fn configured_class_is_respected() {
        let annotator = Annotator::new(AnnotatorConfig {
            class_of_interest: "cat".to_string(),
        });
        let frame = annotator.annotate(
            Frame::filled(640, 480, [0, 0, 0]),
            &[det("person", 200, 200)],
        );
        assert!(summary_region_has(&frame, [255, 0, 0]));
    }
}
