//! Encoded bytes -> [`Frame`].
//!
//! The snapshot endpoints observed in the wild serve JPEG, but anything
//! the `image` crate recognizes decodes. A failure here means "no frame
//! this tick", never a pipeline stop.

use crate::error::DecodeError;
use crate::frame::Frame;

/// Decode an encoded still image into an RGB8 frame.
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if image::guess_format(bytes).is_err() {
        return Err(DecodeError::UnsupportedFormat);
    }
    let decoded =
        image::load_from_memory(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    Ok(Frame::from_rgb_image(decoded.into_rgb8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;

    fn encode_jpeg(frame: &Frame) -> Vec<u8> {
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, 90)
            .encode(
                frame.data(),
                frame.width(),
                frame.height(),
                image::ExtendedColorType::Rgb8,
            )
            .expect("encode jpeg");
        bytes
    }

    #[test]
    fn decode_round_trips_dimensions_and_layout() {
        let frame = Frame::filled(64, 48, [200, 40, 90]);
        let decoded = decode(&encode_jpeg(&frame)).expect("decode");
        assert_eq!(decoded.dimensions(), (64, 48));
        assert_eq!(decoded.channels(), 3);
        assert_eq!(decoded.data().len(), 64 * 48 * 3);
    }

    #[test]
    fn garbage_is_unsupported_format() {
        let err = decode(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat));
    }

    #[test]
    fn truncated_jpeg_is_malformed() {
        let frame = Frame::filled(64, 48, [1, 2, 3]);
        let bytes = encode_jpeg(&frame);
        let err = decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
