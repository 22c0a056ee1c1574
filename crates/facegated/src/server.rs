//! HTTP interface: health endpoints and `/verify-face`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use facegate_core::{EuclideanMatcher, Gallery, MatchError, MatchOutcome, Matcher};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::{AllowedOrigins, Config};
use crate::engine::{EngineError, EngineHandle};

/// Multipart field carrying the probe image.
const IMAGE_FIELD: &str = "image";

/// Shared, read-only application state.
pub struct AppState {
    /// Reference gallery, built once at startup.
    pub gallery: Arc<Gallery>,
    /// Extraction engine for probe images.
    pub engine: EngineHandle,
    /// Distance tolerance for the match decision.
    pub tolerance: f32,
}

/// Result of one `/verify-face` request, one variant per response shape.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Matched { identity: String, confidence: f32 },
    NoMatch,
    MissingImage,
    NoProbeFace,
    PayloadTooLarge,
    EmptyGallery,
    ProcessingError,
}

impl VerifyOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            VerifyOutcome::Matched { .. } => StatusCode::OK,
            VerifyOutcome::NoMatch => StatusCode::UNAUTHORIZED,
            VerifyOutcome::MissingImage | VerifyOutcome::NoProbeFace => StatusCode::BAD_REQUEST,
            VerifyOutcome::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            VerifyOutcome::EmptyGallery | VerifyOutcome::ProcessingError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing message for every outcome except a match.
    fn error_message(&self) -> &'static str {
        match self {
            VerifyOutcome::Matched { .. } => "",
            VerifyOutcome::NoMatch => "Face not recognized",
            VerifyOutcome::MissingImage => "No image provided",
            VerifyOutcome::NoProbeFace => "No face detected in the image",
            VerifyOutcome::PayloadTooLarge => "Image too large",
            VerifyOutcome::EmptyGallery => "No known faces available",
            VerifyOutcome::ProcessingError => "Error processing image",
        }
    }
}

/// Success body. Serialized directly so `confidence` keeps its shortest
/// `f32` representation.
#[derive(Serialize)]
struct MatchBody<'a> {
    success: bool,
    user: &'a str,
    confidence: f32,
}

impl IntoResponse for VerifyOutcome {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            VerifyOutcome::Matched {
                identity,
                confidence,
            } => (
                status,
                Json(MatchBody {
                    success: true,
                    user: identity,
                    confidence: *confidence,
                }),
            )
                .into_response(),
            other => (status, Json(json!({ "error": other.error_message() }))).into_response(),
        }
    }
}

/// Build the HTTP router.
pub fn create_app(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/verify-face", post(verify_face))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(list) => {
            let values = list.iter().filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            });
            layer.allow_origin(AllowOrigin::list(values))
        }
    }
}

/// Health check with the number of enrolled faces.
pub async fn home(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Face Recognition Server is running",
        "known_faces": state.gallery.len(),
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Face recognition server is running",
        "known_faces": state.gallery.len(),
    }))
}

/// Verify an uploaded face against the gallery.
///
/// Checks run in order: image present, face detected, gallery non-empty,
/// nearest reference within tolerance.
pub async fn verify_face(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> VerifyOutcome {
    tracing::info!("received face verification request");

    let image = match multipart {
        Ok(mut multipart) => match read_image_field(&mut multipart).await {
            Ok(Some(image)) => image,
            Ok(None) => {
                tracing::warn!("no image provided in request");
                return VerifyOutcome::MissingImage;
            }
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                tracing::warn!(error = %e, "upload exceeds body limit");
                return VerifyOutcome::PayloadTooLarge;
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed multipart body");
                return VerifyOutcome::MissingImage;
            }
        },
        Err(rejection) => {
            tracing::warn!(error = %rejection, "request is not multipart");
            return VerifyOutcome::MissingImage;
        }
    };
    tracing::debug!(bytes = image.len(), "received image");

    let probe = match state.engine.probe(image).await {
        Ok(probe) => probe,
        Err(EngineError::NoFaceDetected) => {
            tracing::warn!("no face detected in the uploaded image");
            return VerifyOutcome::NoProbeFace;
        }
        Err(e) => {
            tracing::error!(error = %e, "error processing image");
            return VerifyOutcome::ProcessingError;
        }
    };

    match EuclideanMatcher.compare(&probe, state.gallery.entries(), state.tolerance) {
        Ok(MatchOutcome::Matched {
            identity,
            distance,
            confidence,
            ..
        }) => {
            tracing::info!(user = %identity, distance, confidence, "face recognized");
            VerifyOutcome::Matched {
                identity,
                confidence,
            }
        }
        Ok(MatchOutcome::NoMatch { closest_distance }) => {
            tracing::warn!(closest_distance, "face not recognized in known faces");
            VerifyOutcome::NoMatch
        }
        Err(MatchError::EmptyGallery) => {
            tracing::error!("no known faces available for comparison");
            VerifyOutcome::EmptyGallery
        }
        Err(e) => {
            tracing::error!(error = %e, "error comparing faces");
            VerifyOutcome::ProcessingError
        }
    }
}

/// Bytes of the first non-empty `image` field, if any.
async fn read_image_field(multipart: &mut Multipart) -> Result<Option<Bytes>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        tracing::debug!(filename = ?field.file_name(), "image field");
        let bytes = field.bytes().await?;
        if !bytes.is_empty() {
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}
