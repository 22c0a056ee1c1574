//! Face descriptor extraction seam.
//!
//! The gallery builder and the daemon engine only see [`FaceExtractor`];
//! [`OnnxExtractor`] is the SCRFD + ArcFace implementation.

use crate::detector::{DetectorError, FaceDetector};
use crate::frame::Frame;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    /// Raised by non-ONNX extractors (test doubles, alternative backends).
    #[error("extraction failed: {0}")]
    Other(String),
}

/// Detects faces in a frame and turns one detected face into a descriptor.
pub trait FaceExtractor {
    /// Detect faces, in the extractor's own order (most confident first for SCRFD).
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ExtractError>;

    /// Compute the descriptor for one detected face.
    fn encode(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, ExtractError>;

    /// Descriptor of the first detected face, or `None` if no face was found.
    /// Additional faces are ignored.
    fn first_face(&mut self, frame: &Frame) -> Result<Option<Embedding>, ExtractError> {
        let faces = self.detect(frame)?;
        tracing::debug!(count = faces.len(), "faces detected");
        match faces.first() {
            Some(face) => self.encode(frame, face).map(Some),
            None => Ok(None),
        }
    }
}

impl<E: FaceExtractor + ?Sized> FaceExtractor for Box<E> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ExtractError> {
        (**self).detect(frame)
    }

    fn encode(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, ExtractError> {
        (**self).encode(frame, face)
    }
}

/// SCRFD detection followed by ArcFace embedding, both via ONNX Runtime.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    /// Load both models. Fails fast if either file is missing.
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(scrfd_path)?;
        tracing::info!(path = scrfd_path, "SCRFD detector loaded");

        let recognizer = FaceRecognizer::load(arcface_path)?;
        tracing::info!(path = arcface_path, "ArcFace recognizer loaded");

        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceExtractor for OnnxExtractor {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ExtractError> {
        Ok(self.detector.detect(frame)?)
    }

    fn encode(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, ExtractError> {
        Ok(self.recognizer.extract(frame, face)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reports `faces` detections and encodes each as its index.
    struct Counting {
        faces: usize,
        encoded: Vec<usize>,
    }

    impl FaceExtractor for Counting {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, ExtractError> {
            Ok((0..self.faces)
                .map(|i| BoundingBox {
                    x: i as f32,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                    confidence: 0.9,
                    landmarks: None,
                })
                .collect())
        }

        fn encode(
            &mut self,
            _frame: &Frame,
            face: &BoundingBox,
        ) -> Result<Embedding, ExtractError> {
            self.encoded.push(face.x as usize);
            Ok(Embedding::new(vec![face.x]))
        }
    }

    fn frame() -> Frame {
        Frame {
            data: vec![0; 4],
            width: 2,
            height: 2,
        }
    }

    #[test]
    fn test_first_face_encodes_only_first_detection() {
        let mut ex = Counting { faces: 3, encoded: vec![] };
        let emb = ex.first_face(&frame()).unwrap().unwrap();
        assert_eq!(emb.values, vec![0.0]);
        assert_eq!(ex.encoded, vec![0]);
    }

    #[test]
    fn test_first_face_none_without_detections() {
        let mut ex = Counting { faces: 0, encoded: vec![] };
        assert!(ex.first_face(&frame()).unwrap().is_none());
        assert!(ex.encoded.is_empty());
    }

    #[test]
    fn test_boxed_extractor_delegates() {
        let mut ex: Box<dyn FaceExtractor> = Box::new(Counting { faces: 1, encoded: vec![] });
        assert!(ex.first_face(&frame()).unwrap().is_some());
    }
}
