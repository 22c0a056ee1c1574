//! facegate-core: face verification against an enrolled reference gallery.
//!
//! Uses SCRFD for face detection and ArcFace for face descriptors, both
//! running via ONNX Runtime for CPU inference. The gallery builder and the
//! match decision only depend on the [`FaceExtractor`] trait.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod frame;
pub mod gallery;
pub mod matcher;
pub mod recognizer;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

use std::path::PathBuf;

pub use extractor::{ExtractError, FaceExtractor, OnnxExtractor};
pub use frame::{Frame, FrameError};
pub use gallery::{build_gallery, identity_from_filename, GalleryBuild, GalleryError, SkipReason};
pub use matcher::{EuclideanMatcher, MatchError, MatchOutcome, Matcher, DEFAULT_TOLERANCE};
pub use types::{BoundingBox, Embedding, Gallery, GalleryEntry};

/// SCRFD detection model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/facegate/models`, falling back to `~/.local/share/facegate/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
        .join("models")
}
