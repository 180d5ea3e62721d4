//! Inpainting models and model construction
//!
//! An [`InpaintModel`] turns a normalized image and mask into an inpainted
//! RGB raster. Models are built once at startup from an [`InpaintConfig`]
//! and a [`BackendFactory`].

pub mod ddim;
pub mod lama;
pub mod ldm;

use crate::{
    config::{InpaintConfig, ModelKind},
    error::{InpaintError, Result},
    inference::BackendFactory,
    utils::{validation::LDM_GRAPH_FILES, ModelValidator},
};
use image::RgbImage;
use ndarray::{Array3, ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use lama::LaMa;
pub use ldm::{Ldm, LdmBackends};

/// Default LaMa weights (ONNX export with a fixed 512x512 input)
pub const DEFAULT_LAMA_URL: &str =
    "https://huggingface.co/Carve/LaMa-ONNX/resolve/main/lama_fp32.onnx";

/// Where a model graph comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    /// Graph file on the local filesystem
    External(PathBuf),
    /// Graph fetched once into the weights cache
    Url(String),
}

impl ModelSource {
    #[must_use]
    pub fn default_lama() -> Self {
        Self::Url(DEFAULT_LAMA_URL.to_string())
    }

    /// Interpret a command-line value as a URL or a local path
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Self::Url(value.to_string())
        } else {
            Self::External(PathBuf::from(value))
        }
    }

    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::External(path) => format!(
                "external:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
            Self::Url(url) => format!("url:{}", url.rsplit('/').next().unwrap_or_default()),
        }
    }
}

/// An inpainting network behind a uniform call interface
pub trait InpaintModel: Send {
    /// Fill the masked pixels of `image`
    ///
    /// `image` is `[3,H,W]` and `mask` is `[1,H,W]`, both in `[0,1]`. The output
    /// has the same `H,W` and keeps every pixel outside the mask.
    ///
    /// # Errors
    /// - `Validation` when the shapes disagree
    /// - `Inference` for any failure inside the network call
    fn inpaint(&mut self, image: &Array3<f32>, mask: &Array3<f32>) -> Result<RgbImage>;

    /// Free cached runtime resources held between calls
    fn release_cache(&mut self);

    fn kind(&self) -> ModelKind;
}

impl std::fmt::Debug for dyn InpaintModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InpaintModel")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// `[C,H,W]` to `[1,C,H,W]`
pub(crate) fn to_batched(tensor: Array3<f32>) -> ArrayD<f32> {
    tensor.insert_axis(Axis(0)).into_dyn()
}

/// Build the configured model; URL sources must already be resolved to files
///
/// # Errors
/// - Missing or invalid graph files
/// - Backend creation failures
pub fn create_model(
    config: &InpaintConfig,
    factory: &dyn BackendFactory,
) -> Result<Box<dyn InpaintModel>> {
    config.validate()?;

    match config.model {
        ModelKind::Lama => {
            let path = match &config.lama_model {
                ModelSource::External(path) => path,
                ModelSource::Url(url) => {
                    return Err(InpaintError::model(format!(
                        "LaMa weights must be downloaded before the model is built: {url}"
                    )))
                },
            };
            ModelValidator::validate_model_file_path(path)?;
            log::info!("Loading LaMa from {}", path.display());

            let backend = factory.create_backend(config.backend_type, path, config)?;
            Ok(Box::new(LaMa::new(backend, config)))
        },
        ModelKind::Ldm => {
            let dir = config.ldm_model_dir.as_ref().ok_or_else(|| {
                InpaintError::invalid_config("LDM requires a model directory")
            })?;
            ModelValidator::validate_ldm_model_dir(dir)?;
            log::info!("Loading LDM graphs from {}", dir.display());

            let [encode, decode, diffusion] = LDM_GRAPH_FILES;
            let load = |name: &str| {
                factory.create_backend(config.backend_type, &dir.join(name), config)
            };
            let backends = LdmBackends {
                encoder: load(encode)?,
                decoder: load(decode)?,
                diffusion: load(diffusion)?,
            };
            Ok(Box::new(Ldm::new(backends, config)?))
        },
    }
}
