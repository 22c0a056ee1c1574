//! Decoded grayscale image handed to the detector and recognizer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

/// A decoded grayscale image.
///
/// Owns its pixel buffer; dropping the frame releases it.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Decode an encoded image (JPEG, PNG, ...) and convert it to 8-bit luma.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let gray = image::load_from_memory(bytes)?.to_luma8();
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        Ok(Self {
            data: gray.into_raw(),
            width,
            height,
        })
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, value: u8) -> Vec<u8> {
        let img = GrayImage::from_pixel(width, height, Luma([value]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let frame = Frame::decode(&png_bytes(6, 4, 90)).unwrap();
        assert_eq!((frame.width, frame.height), (6, 4));
        assert_eq!(frame.data.len(), 24);
        assert!((frame.avg_brightness() - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = Frame::decode(b"definitely not an image").err().unwrap();
        assert!(matches!(err, FrameError::Decode(_)));
    }

    #[test]
    fn test_avg_brightness_empty() {
        let frame = Frame { data: vec![], width: 0, height: 0 };
        assert_eq!(frame.avg_brightness(), 0.0);
    }
}
