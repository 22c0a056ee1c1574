//! Match decision: nearest enrolled face under a distance tolerance.

use crate::types::{Embedding, GalleryEntry};
use serde::Serialize;
use thiserror::Error;

/// Default distance tolerance. Loose for ArcFace-style embeddings; tune per deployment.
pub const DEFAULT_TOLERANCE: f32 = 1.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("no known faces available")]
    EmptyGallery,
    #[error("dimension mismatch for {identity}: probe {probe}, reference {reference}")]
    DimensionMismatch {
        identity: String,
        probe: usize,
        reference: usize,
    },
}

/// Outcome of comparing one probe against the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched {
        identity: String,
        /// Position of the matched entry in enrollment order.
        index: usize,
        distance: f32,
        /// `1 - distance`, not clamped.
        confidence: f32,
    },
    NoMatch {
        /// Distance to the nearest enrolled face.
        closest_distance: f32,
    },
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        tolerance: f32,
    ) -> Result<MatchOutcome, MatchError>;
}

/// Euclidean nearest-neighbour matcher.
///
/// The nearest entry over the whole gallery is selected first and is the
/// only one checked against the tolerance. Ties go to the earliest entry
/// in enrollment order.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        tolerance: f32,
    ) -> Result<MatchOutcome, MatchError> {
        if gallery.is_empty() {
            return Err(MatchError::EmptyGallery);
        }

        let distances = gallery
            .iter()
            .map(|entry| {
                if entry.embedding.dim() != probe.dim() {
                    return Err(MatchError::DimensionMismatch {
                        identity: entry.identity.clone(),
                        probe: probe.dim(),
                        reference: entry.embedding.dim(),
                    });
                }
                Ok(probe.euclidean_distance(&entry.embedding))
            })
            .collect::<Result<Vec<f32>, _>>()?;

        tracing::debug!(?distances, tolerance, "face distances");

        let mut best_idx = 0;
        for (i, &d) in distances.iter().enumerate().skip(1) {
            if d < distances[best_idx] {
                best_idx = i;
            }
        }
        let best = distances[best_idx];

        if best < tolerance {
            Ok(MatchOutcome::Matched {
                identity: gallery[best_idx].identity.clone(),
                index: best_idx,
                distance: best,
                confidence: 1.0 - best,
            })
        } else {
            Ok(MatchOutcome::NoMatch {
                closest_distance: best,
            })
        }
    }
}
