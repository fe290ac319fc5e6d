//! Object detection over decoded frames.
//!
//! Detection is a closed set of backends selected once at configuration
//! time: no detection at all, a YOLO-family ONNX model, or an SSD-family
//! ONNX model. Backends share one contract ([`DetectorBackend`]) and one
//! preprocessing description ([`Preprocess`]). Everything after the model
//! runs (score filtering, label resolution, coordinate scaling) is
//! backend-specific.

mod backend;
mod backends;
mod engine;
mod labels;
mod result;

pub use backend::{DetectorBackend, Preprocess};
pub use backends::{NoneBackend, SsdBackend, YoloBackend};
pub use engine::{BackendKind, DetectionEngine};
pub use labels::{load_class_list, COCO_CLASSES};
pub use result::{center_offset, contains_label, BoundingBox, Detection};
