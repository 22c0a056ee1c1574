//! Deterministic stand-ins for the ONNX pipeline, for tests in this and
//! dependent crates.

use crate::extractor::{ExtractError, FaceExtractor};
use crate::frame::Frame;
use crate::types::{BoundingBox, Embedding};
use image::{GrayImage, ImageFormat, Luma};
use std::io::Cursor;

/// Maps mean brightness to a 2-d descriptor `[brightness / 255, 0]`.
///
/// Frames darker than 16 contain no face; fully saturated frames fail to encode.
pub struct BrightnessExtractor;

impl FaceExtractor for BrightnessExtractor {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ExtractError> {
        if frame.avg_brightness() < 16.0 {
            return Ok(vec![]);
        }
        Ok(vec![BoundingBox {
            x: 0.0,
            y: 0.0,
            width: frame.width as f32,
            height: frame.height as f32,
            confidence: 0.99,
            landmarks: None,
        }])
    }

    fn encode(&mut self, frame: &Frame, _face: &BoundingBox) -> Result<Embedding, ExtractError> {
        let b = frame.avg_brightness();
        if b > 254.0 {
            return Err(ExtractError::Other("saturated".into()));
        }
        Ok(Embedding::new(vec![b / 255.0, 0.0]))
    }
}

/// An 8×8 uniform gray PNG.
///
/// # Panics
///
/// Panics if PNG encoding fails.
pub fn png_bytes(value: u8) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    GrayImage::from_pixel(8, 8, Luma([value]))
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encoding an in-memory PNG");
    buf.into_inner()
}
