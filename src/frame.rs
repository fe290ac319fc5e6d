//! Decoded pixel buffers.
//!
//! A [`Frame`] is one decoded image produced by a single acquisition tick:
//! tightly packed RGB8, row-major. Frames move through the pipeline by
//! value and are dropped at the end of the tick unless the recorder keeps
//! them.

use image::RgbImage;

/// One decoded RGB8 image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

pub const CHANNELS: u32 = 3;

impl Frame {
    /// Wrap raw RGB8 bytes. Returns `None` when the buffer length does not
    /// match `width * height * 3`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(CHANNELS as usize)?;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> u32 {
        CHANNELS
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Move the buffer into an `image::RgbImage` without copying.
    pub fn into_rgb_image(self) -> RgbImage {
        RgbImage::from_raw(self.width, self.height, self.data)
            .expect("frame buffer length is validated at construction")
    }

    /// Move an `image::RgbImage` back into a `Frame` without copying.
    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    /// Solid-color frame, used by tests and the stub source.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity((width * height * CHANNELS) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * self.width + x) * CHANNELS) as usize;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}
