//! Reference gallery construction from an enrollment directory.
//!
//! Each enrollment image contributes at most one entry, named after the
//! file. Bad files are logged and skipped; they never abort the build.

use crate::extractor::FaceExtractor;
use crate::frame::Frame;
use crate::types::{Embedding, Gallery, GalleryEntry};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Token stripped from enrollment file names before deriving the identity.
pub const IDENTITY_PREFIX: &str = "known_face_";

/// Enrollment file extensions, matched case-insensitively.
pub const ENROLLMENT_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("cannot create enrollment directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot list enrollment directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Why an enrollment file did not make it into the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    NoFace,
    Read(String),
    Decode(String),
    Extract(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub file: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Result of a gallery build: the gallery plus every file that was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryBuild {
    pub gallery: Gallery,
    pub skipped: Vec<SkippedFile>,
}

/// Derive a display identity from an enrollment file name.
///
/// `known_face_john_doe.jpg` becomes `John Doe`.
pub fn identity_from_filename(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    title_case(&stem.replace(IDENTITY_PREFIX, "").replace('_', " "))
}

/// Uppercase the first letter of every run of letters and lowercase the rest.
/// Any non-letter ends a run, so `o'neil` becomes `O'Neil`.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

fn is_enrollment_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            ENROLLMENT_EXTENSIONS
                .iter()
                .any(|known| e.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Build the reference gallery from every enrollment image in `dir`.
///
/// Files are processed in file-name order. A missing directory is created
/// and yields an empty gallery.
pub fn build_gallery<E>(dir: &Path, extractor: &mut E) -> Result<GalleryBuild, GalleryError>
where
    E: FaceExtractor + ?Sized,
{
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|source| GalleryError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        tracing::warn!(dir = %dir.display(), "created empty enrollment directory");
        return Ok(GalleryBuild {
            gallery: Gallery::default(),
            skipped: Vec::new(),
        });
    }

    tracing::info!(dir = %dir.display(), "loading enrolled faces");

    let read_dir_err = |source| GalleryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(read_dir_err)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_enrollment_image(p))
        .collect();
    files.sort();

    let mut gallery = Gallery::default();
    let mut skipped = Vec::new();

    for path in files {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let identity = identity_from_filename(&file);
        tracing::debug!(file = %file, "processing enrollment image");

        match enroll_file(&path, extractor) {
            Ok(embedding) => {
                tracing::info!(identity = %identity, file = %file, "loaded face");
                gallery.push(GalleryEntry {
                    identity,
                    embedding,
                    source: file,
                });
            }
            Err(reason) => {
                match &reason {
                    SkipReason::NoFace => {
                        tracing::warn!(file = %file, "no face detected in reference image")
                    }
                    other => tracing::error!(
                        file = %file,
                        reason = ?other,
                        "failed to load reference image"
                    ),
                }
                skipped.push(SkippedFile { file, reason });
            }
        }
    }

    tracing::info!(
        total = gallery.len(),
        skipped = skipped.len(),
        "total known faces loaded"
    );
    tracing::debug!(names = ?gallery.identities(), "known names");

    Ok(GalleryBuild { gallery, skipped })
}

/// Read, decode and encode one enrollment file. The decoded frame is
/// dropped before returning on every path.
fn enroll_file<E>(path: &Path, extractor: &mut E) -> Result<Embedding, SkipReason>
where
    E: FaceExtractor + ?Sized,
{
    let bytes = std::fs::read(path).map_err(|e| SkipReason::Read(e.to_string()))?;
    let frame = Frame::decode(&bytes).map_err(|e| SkipReason::Decode(e.to_string()))?;
    match extractor.first_face(&frame) {
        Ok(Some(embedding)) => Ok(embedding),
        Ok(None) => Err(SkipReason::NoFace),
        Err(e) => Err(SkipReason::Extract(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BrightnessExtractor;
    use image::{GrayImage, Luma};

    fn write_png(dir: &Path, name: &str, value: u8) {
        GrayImage::from_pixel(8, 8, Luma([value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_identity_from_filename() {
        assert_eq!(identity_from_filename("known_face_john_doe.jpg"), "John Doe");
        assert_eq!(identity_from_filename("ALICE.JPEG"), "Alice");
        assert_eq!(identity_from_filename("known_face_mary_o'neil.png"), "Mary O'Neil");
        assert_eq!(identity_from_filename("bob_2nd.jpg"), "Bob 2Nd");
        assert_eq!(identity_from_filename("known_face_.jpg"), "");
    }

    #[test]
    fn test_title_case_lowers_tail() {
        assert_eq!(title_case("mcDONALD ann"), "Mcdonald Ann");
    }

    #[test]
    fn test_extension_filter() {
        assert!(is_enrollment_image(Path::new("a.jpg")));
        assert!(is_enrollment_image(Path::new("a.JPG")));
        assert!(is_enrollment_image(Path::new("a.jpeg")));
        assert!(is_enrollment_image(Path::new("a.png")));
        assert!(!is_enrollment_image(Path::new("a.txt")));
        assert!(!is_enrollment_image(Path::new("jpg")));
    }

    #[test]
    fn test_missing_directory_is_created_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("faces").join("known");
        let build = build_gallery(&dir, &mut BrightnessExtractor).unwrap();
        assert!(build.gallery.is_empty());
        assert!(build.skipped.is_empty());
        assert!(dir.is_dir());
    }

    #[test]
    fn test_corrupt_and_faceless_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_png(tmp.path(), "known_face_alice_smith.png", 128);
        write_png(tmp.path(), "known_face_blank.png", 0);
        std::fs::write(tmp.path().join("known_face_broken.jpg"), b"not a jpeg").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"ignored").unwrap();

        let build = build_gallery(tmp.path(), &mut BrightnessExtractor).unwrap();

        assert_eq!(build.gallery.identities(), vec!["Alice Smith"]);
        assert_eq!(build.gallery.entries()[0].source, "known_face_alice_smith.png");

        assert_eq!(build.skipped.len(), 2);
        let blank = build.skipped.iter().find(|s| s.file == "known_face_blank.png").unwrap();
        assert_eq!(blank.reason, SkipReason::NoFace);
        let broken = build.skipped.iter().find(|s| s.file == "known_face_broken.jpg").unwrap();
        assert!(matches!(broken.reason, SkipReason::Decode(_)));
    }

    #[test]
    fn test_extraction_failure_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_png(tmp.path(), "bob.png", 100);
        write_png(tmp.path(), "glare.png", 255);

        let build = build_gallery(tmp.path(), &mut BrightnessExtractor).unwrap();

        assert_eq!(build.gallery.identities(), vec!["Bob"]);
        assert!(matches!(build.skipped[0].reason, SkipReason::Extract(_)));
    }

    #[test]
    fn test_duplicate_identities_kept_in_file_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_png(tmp.path(), "known_face_bob.png", 40);
        write_png(tmp.path(), "bob.jpeg.png", 60);
        write_png(tmp.path(), "known_face_alice.png", 80);

        let build = build_gallery(tmp.path(), &mut BrightnessExtractor).unwrap();

        // "bob.jpeg.png" sorts first and its stem is "bob.jpeg".
        assert_eq!(build.gallery.identities(), vec!["Bob.Jpeg", "Alice", "Bob"]);
    }

    #[test]
    fn test_skipped_file_serializes_reason() {
        let skipped = SkippedFile {
            file: "x.jpg".into(),
            reason: SkipReason::Decode("bad header".into()),
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["file"], "x.jpg");
        assert_eq!(json["reason"], "decode");
        assert_eq!(json["detail"], "bad header");
    }
}
