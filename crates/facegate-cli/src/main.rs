use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{
    build_gallery, identity_from_filename, EuclideanMatcher, FaceExtractor, Frame, MatchError,
    Matcher, OnnxExtractor, ARCFACE_MODEL_FILE, DEFAULT_TOLERANCE, SCRFD_MODEL_FILE,
};
use serde_json::json;

#[derive(Parser)]
#[command(name = "facegate", about = "facegate offline gallery and verification tool")]
struct Cli {
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true, env = "FACEGATE_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the gallery and report loaded and skipped enrollment images
    Gallery {
        /// Enrollment directory
        #[arg(long, env = "FACEGATE_FACES_DIR", default_value = "face_recognition/known_faces")]
        dir: PathBuf,
    },
    /// Verify one image against the gallery, as the server would
    Verify {
        /// Probe image
        image: PathBuf,
        /// Enrollment directory
        #[arg(long, env = "FACEGATE_FACES_DIR", default_value = "face_recognition/known_faces")]
        dir: PathBuf,
        /// Distance tolerance for a match
        #[arg(long, env = "FACEGATE_TOLERANCE", default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f32,
    },
    /// Print the identity derived from an enrollment file name
    Identity {
        /// File name, e.g. known_face_jane_doe.jpg
        file_name: String,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let model_dir = cli.model_dir.unwrap_or_else(facegate_core::default_model_dir);

    match cli.command {
        Commands::Identity { file_name } => {
            println!("{}", identity_from_filename(&file_name));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Gallery { dir } => {
            let mut extractor = load_extractor(&model_dir)?;
            let build = build_gallery(&dir, &mut extractor)?;
            println!("{}", serde_json::to_string_pretty(&build)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify {
            image,
            dir,
            tolerance,
        } => {
            let mut extractor = load_extractor(&model_dir)?;
            let build = build_gallery(&dir, &mut extractor)?;
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let frame = Frame::decode(&bytes)?;
            tracing::info!(
                image = %image.display(),
                width = frame.width,
                height = frame.height,
                known_faces = build.gallery.len(),
                "verifying probe image"
            );

            let Some(probe) = extractor.first_face(&frame)? else {
                println!("{}", json!({ "outcome": "no_face" }));
                return Ok(ExitCode::from(2));
            };

            match EuclideanMatcher.compare(&probe, build.gallery.entries(), tolerance) {
                Ok(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                    Ok(if outcome.is_match() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    })
                }
                Err(MatchError::EmptyGallery) => {
                    println!("{}", json!({ "outcome": "empty_gallery" }));
                    Ok(ExitCode::from(3))
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

fn load_extractor(model_dir: &std::path::Path) -> Result<OnnxExtractor> {
    let scrfd = model_dir.join(SCRFD_MODEL_FILE);
    let arcface = model_dir.join(ARCFACE_MODEL_FILE);
    let extractor = OnnxExtractor::load(&scrfd.to_string_lossy(), &arcface.to_string_lossy())
        .context("loading face models")?;
    tracing::info!(model_dir = %model_dir.display(), "face models loaded");
    Ok(extractor)
}
