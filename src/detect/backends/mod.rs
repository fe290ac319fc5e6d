mod none;
mod ssd;
mod yolo;

pub use none::NoneBackend;
pub use ssd::SsdBackend;
pub use yolo::YoloBackend;
