//! Class-label tables.

use std::fs;
use std::path::Path;

use crate::error::ModelLoadError;

/// The 80 COCO classes in model output order. YOLO-family models report
/// 0-based indices into this table.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Read a newline-delimited class-name list (one name per line, blank
/// lines ignored). SSD-family models report 1-based indices into it.
pub fn load_class_list(path: &Path) -> Result<Vec<String>, ModelLoadError> {
    let raw = fs::read_to_string(path)
        .map_err(|_| ModelLoadError::ClassListNotFound(path.to_path_buf()))?;
    let names: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(ModelLoadError::EmptyClassList(path.to_path_buf()));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn coco_table_is_complete_and_person_first() {
        assert_eq!(COCO_CLASSES.len(), 80);
        assert_eq!(COCO_CLASSES[0], "person");
        assert_eq!(COCO_CLASSES[79], "toothbrush");
    }

    #[test]
    fn class_list_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "person\n\nbicycle\ncar\n").unwrap();
        let names = load_class_list(file.path()).unwrap();
        assert_eq!(names, vec!["person", "bicycle", "car"]);
    }

    #[test]
    fn missing_and_empty_lists_are_typed_errors() {
        let missing = Path::new("/nonexistent/coco.names");
        assert!(matches!(
            load_class_list(missing),
            Err(ModelLoadError::ClassListNotFound(_))
        ));

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            load_class_list(empty.path()),
            Err(ModelLoadError::EmptyClassList(_))
        ));
    }
}
