use std::panic::{self, AssertUnwindSafe};

use axum::body::Bytes;
use facegate_core::{Embedding, ExtractError, FaceExtractor, Frame, FrameError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("image decode failed: {0}")]
    Decode(#[from] FrameError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("no face detected in the image")]
    NoFaceDetected,
    #[error("extraction panicked: {0}")]
    Panicked(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Probe {
        image: Bytes,
        reply: oneshot::Sender<Result<Embedding, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode an uploaded image and extract the descriptor of its first face.
    pub async fn probe(&self, image: Bytes) -> Result<Embedding, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Probe {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread that owns the extractor.
///
/// Requests are served one at a time in arrival order; `queue` bounds how
/// many may wait. A panic while serving a request is reported to that
/// request only. The thread exits once every handle is dropped.
pub fn spawn_engine<E>(mut extractor: E, queue: usize) -> Result<EngineHandle, EngineError>
where
    E: FaceExtractor + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue.max(1));

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Probe { image, reply } => {
                        let probe = AssertUnwindSafe(|| run_probe(&mut extractor, &image));
                        let result = panic::catch_unwind(probe).unwrap_or_else(|payload| {
                            let message = panic_message(payload.as_ref());
                            tracing::error!(error = %message, "probe extraction panicked");
                            Err(EngineError::Panicked(message))
                        });
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Decode, detect, and encode the first face. The decoded frame is dropped
/// on return whatever the outcome.
fn run_probe<E: FaceExtractor>(extractor: &mut E, image: &[u8]) -> Result<Embedding, EngineError> {
    let frame = Frame::decode(image)?;
    tracing::debug!(width = frame.width, height = frame.height, "probe: decoded image");

    extractor
        .first_face(&frame)?
        .ok_or(EngineError::NoFaceDetected)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
