use std::sync::Arc;

use anyhow::{Context, Result};
use facegate_core::{build_gallery, OnnxExtractor};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod server;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        port = config.port,
        faces_dir = %config.faces_dir.display(),
        tolerance = config.tolerance,
        "facegated starting"
    );

    let mut extractor =
        OnnxExtractor::load(&config.scrfd_model_path(), &config.arcface_model_path())
            .context("loading face models")?;

    // Gallery build is blocking inference over every enrollment image.
    let faces_dir = config.faces_dir.clone();
    let (extractor, build) = tokio::task::spawn_blocking(move || {
        let build = build_gallery(&faces_dir, &mut extractor);
        (extractor, build)
    })
    .await?;
    let build = build.context("building reference gallery")?;

    if build.gallery.is_empty() {
        tracing::warn!("no known faces were loaded at startup");
    }

    let engine = engine::spawn_engine(extractor, config.engine_queue)?;

    let state = Arc::new(server::AppState {
        gallery: Arc::new(build.gallery),
        engine,
        tolerance: config.tolerance,
    });
    let app = server::create_app(state, &config);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "facegated ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facegated shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
