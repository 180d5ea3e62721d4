#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # lama-cleaner
//!
//! A local image inpainting server. A client uploads an image and a mask of
//! painted strokes; the server fills the masked region with a LaMa or latent
//! diffusion (LDM) model and returns the result as a JPEG.
//!
//! ## Features
//!
//! - **Two Models**: LaMa (single pass, crop mode for large images) and LDM (DDIM sampling)
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Hardware Acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **Weights Management**: Automatic downloading and caching of LaMa weights
//! - **HTTP API**: `axum` server compatible with the lama-cleaner front-end
//! - **Desktop Window**: Optional app-mode browser window around the same server
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lama_cleaner::{prepare_weights, InpaintConfig, InpaintProcessor, ModelKind};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = InpaintConfig::builder().model(ModelKind::Lama).build()?;
//! let config = prepare_weights(config, true).await?;
//!
//! let mut processor = InpaintProcessor::new(config)?;
//! let image = std::fs::read("photo.jpg")?;
//! let mask = std::fs::read("mask.png")?;
//! let jpeg = processor.process_to_jpeg(&image, &mask, "1080")?;
//! std::fs::write("result.jpeg", jpeg)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line interface, progress bars and subscriber setup
//! - `webp-support` (default): WebP upload support
//! - `tracing-json`: JSON log output

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod server;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use backends::*;
pub use cache::{format_size, CachedWeightsInfo, WeightsCache};
pub use config::{ExecutionProvider, InpaintConfig, InpaintConfigBuilder, ModelKind, ServerConfig};
pub use download::WeightsDownloader;
pub use error::{InpaintError, Result};
pub use inference::{BackendFactory, BackendType, DefaultBackendFactory, InferenceBackend};
pub use models::{create_model, InpaintModel, ModelSource};
pub use processor::InpaintProcessor;
pub use server::{router, AppState};
pub use services::ImageCodec;
pub use types::{InpaintResult, Interpolation, ProcessingTimings, SizeLimit};
#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{TracingConfig, TracingFormat};

use tracing::Instrument;
use utils::ModelValidator;

/// Resolve URL model sources into cached local files
///
/// Downloads the LaMa weights on first use. Local sources and the LDM model
/// (which always reads from a local directory) pass through unchanged.
///
/// # Errors
/// - Network or file system errors while downloading
pub async fn prepare_weights(mut config: InpaintConfig, show_progress: bool) -> Result<InpaintConfig> {
    if config.model != ModelKind::Lama {
        return Ok(config);
    }

    if let ModelSource::Url(url) = &config.lama_model {
        ModelValidator::validate_model_url(url)?;
        let downloader = WeightsDownloader::new()?;
        let path = downloader
            .ensure_weights(url, None, show_progress)
            .instrument(tracing_config::spans::download(url))
            .await?;
        config.lama_model = ModelSource::External(path);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_weights_keeps_local_sources() {
        let config = InpaintConfig {
            lama_model: ModelSource::External("weights/lama.onnx".into()),
            ..InpaintConfig::default()
        };
        let prepared = prepare_weights(config.clone(), false).await.unwrap();
        assert_eq!(prepared.lama_model, config.lama_model);
    }

    #[tokio::test]
    async fn test_prepare_weights_skips_ldm() {
        let config = InpaintConfig {
            model: ModelKind::Ldm,
            ..InpaintConfig::default()
        };
        let prepared = prepare_weights(config, false).await.unwrap();
        assert_eq!(prepared.lama_model, ModelSource::default_lama());
    }
}
