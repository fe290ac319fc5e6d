//! Detection results.

/// Axis-aligned box in pixel coordinates of the source frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn center_x(&self) -> i32 {
        self.x + (self.width / 2) as i32
    }

    pub fn center_y(&self) -> i32 {
        self.y + (self.height / 2) as i32
    }
}

/// One model-reported object instance within a frame. No identity across
/// frames; a new set is produced every tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    /// In [0, 1]; already filtered against the configured threshold.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// True when at least one detection carries `label`.
pub fn contains_label(detections: &[Detection], label: &str) -> bool {
    detections.iter().any(|d| d.label == label)
}

/// Horizontal offset between the frame center and the center of the first
/// detection carrying `label` (positive = object left of center). `None`
/// when no such detection exists.
pub fn center_offset(frame_width: u32, detections: &[Detection], label: &str) -> Option<i32> {
    let target = detections.iter().find(|d| d.label == label)?;
    Some((frame_width / 2) as i32 - target.bbox.center_x())
}
