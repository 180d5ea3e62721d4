//! Configuration types for the inpainting pipeline and the HTTP server

use crate::{
    error::{InpaintError, Result},
    inference::BackendType,
    models::ModelSource,
    types::Interpolation,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable pointing at the front-end build directory
pub const BUILD_DIR_ENV: &str = "LAMA_CLEANER_BUILD_DIR";

/// Front-end build directory used when `LAMA_CLEANER_BUILD_DIR` is unset
pub const DEFAULT_BUILD_DIR: &str = "./lama_cleaner/app/build";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    #[default]
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            // torch-style device strings such as "cuda:0" select the CUDA provider
            "cuda" | "gpu" => Ok(Self::Cuda),
            other if other.starts_with("cuda:") => Ok(Self::Cuda),
            "coreml" | "mps" => Ok(Self::CoreMl),
            other => Err(InpaintError::invalid_config(format!(
                "Unknown device: {}. Supported: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// Which inpainting network serves requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ModelKind {
    /// Large-mask inpainting with Fourier convolutions
    #[default]
    Lama,
    /// Latent diffusion inpainting sampled with DDIM
    Ldm,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lama => write!(f, "lama"),
            Self::Ldm => write!(f, "ldm"),
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lama" => Ok(Self::Lama),
            "ldm" => Ok(Self::Ldm),
            other => Err(InpaintError::invalid_config(format!(
                "Not supported model: {}. Supported: lama, ldm",
                other
            ))),
        }
    }
}

/// Configuration of the model handle and the per-request pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InpaintConfig {
    /// Selected network
    pub model: ModelKind,

    /// Inference engine
    pub backend_type: BackendType,

    /// Execution provider for the ONNX backend
    pub execution_provider: ExecutionProvider,

    /// LaMa weights (ONNX graph)
    pub lama_model: ModelSource,

    /// Fixed spatial input size of the LaMa graph (`None` = dynamic shapes)
    pub lama_input_size: Option<u32>,

    /// Directory holding the three LDM graphs
    pub ldm_model_dir: Option<PathBuf>,

    /// Image area `[width, height]` above which LaMa switches to crop mode
    pub crop_trigger_size: [u32; 2],

    /// Margin around each mask region's bounding box in crop mode
    pub crop_margin: u32,

    /// DDIM sampling steps for LDM
    pub ldm_steps: usize,

    /// Seed for the LDM initial latent noise (`None` = entropy)
    pub seed: Option<u64>,

    /// Resampling kernel for resize-to-limit
    pub interpolation: Interpolation,

    /// JPEG quality for the response (1-100)
    pub jpeg_quality: u8,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Shrink the runtime's device memory arena after every run
    pub release_device_memory: bool,
}

impl Default for InpaintConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::default(),
            lama_model: ModelSource::default_lama(),
            lama_input_size: Some(512),
            ldm_model_dir: None,
            crop_trigger_size: [2042, 2042],
            crop_margin: 256,
            ldm_steps: 50,
            seed: None,
            interpolation: Interpolation::default(),
            jpeg_quality: 100,
            intra_threads: 0,
            inter_threads: 0,
            release_device_memory: true,
        }
    }
}

impl InpaintConfig {
    #[must_use]
    pub fn builder() -> InpaintConfigBuilder {
        InpaintConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - JPEG quality outside 1-100
    /// - LDM steps outside 1-1000
    /// - Zero crop trigger dimensions
    /// - Fixed LaMa input size that is not a positive multiple of 8
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(InpaintError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "1-100",
                Some(100),
            ));
        }

        if self.ldm_steps == 0 || self.ldm_steps > crate::models::ddim::TRAIN_TIMESTEPS {
            return Err(InpaintError::config_value_error(
                "LDM steps",
                self.ldm_steps,
                "1-1000",
                Some(50),
            ));
        }

        if self.crop_trigger_size.contains(&0) {
            return Err(InpaintError::invalid_config(format!(
                "Crop trigger size must be positive, got {}x{}",
                self.crop_trigger_size[0], self.crop_trigger_size[1]
            )));
        }

        if let Some(size) = self.lama_input_size {
            if size == 0 || size % 8 != 0 {
                return Err(InpaintError::config_value_error(
                    "LaMa input size",
                    size,
                    "positive multiple of 8",
                    Some(512),
                ));
            }
        }

        if self.model == ModelKind::Ldm && self.ldm_model_dir.is_none() {
            return Err(InpaintError::invalid_config(
                "LDM requires --ldm-model-dir pointing at the exported ONNX graphs",
            ));
        }

        Ok(())
    }
}

/// Builder for `InpaintConfig`
#[derive(Debug, Default)]
pub struct InpaintConfigBuilder {
    config: InpaintConfig,
}

impl InpaintConfigBuilder {
    #[must_use]
    pub fn model(mut self, model: ModelKind) -> Self {
        self.config.model = model;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn lama_model(mut self, source: ModelSource) -> Self {
        self.config.lama_model = source;
        self
    }

    #[must_use]
    pub fn lama_input_size(mut self, size: Option<u32>) -> Self {
        self.config.lama_input_size = size;
        self
    }

    #[must_use]
    pub fn ldm_model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.ldm_model_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn crop_trigger_size(mut self, width: u32, height: u32) -> Self {
        self.config.crop_trigger_size = [width, height];
        self
    }

    #[must_use]
    pub fn crop_margin(mut self, margin: u32) -> Self {
        self.config.crop_margin = margin;
        self
    }

    #[must_use]
    pub fn ldm_steps(mut self, steps: usize) -> Self {
        self.config.ldm_steps = steps;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.config.seed = seed;
        self
    }

    #[must_use]
    pub fn interpolation(mut self, interpolation: Interpolation) -> Self {
        self.config.interpolation = interpolation;
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Set both intra and inter threads (0 = auto-detect)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn release_device_memory(mut self, release: bool) -> Self {
        self.config.release_device_memory = release;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Any failure reported by [`InpaintConfig::validate`]
    pub fn build(self) -> Result<InpaintConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration of the HTTP surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listening port
    pub port: u16,

    /// Image returned by `GET /inputimage`
    pub input_image: Option<PathBuf>,

    /// Front-end build directory (`index.html` and `static/`)
    pub build_dir: PathBuf,

    /// Launch inside a desktop window instead of a plain server
    pub gui: bool,

    /// Desktop window size `(width, height)`
    pub gui_size: (u32, u32),

    /// Upper bound for a multipart request body in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            input_image: None,
            build_dir: std::env::var(BUILD_DIR_ENV)
                .map_or_else(|_| PathBuf::from(DEFAULT_BUILD_DIR), PathBuf::from),
            gui: false,
            gui_size: (1600, 1000),
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Validate the server settings, including the optional `--input` image
    ///
    /// # Errors
    /// - `--input` does not exist or is not a decodable image
    /// - Zero window dimensions
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.input_image {
            crate::utils::PathValidator::validate_input_image(path)?;
        }

        if self.gui && (self.gui_size.0 == 0 || self.gui_size.1 == 0) {
            return Err(InpaintError::invalid_config(format!(
                "Window size must be positive, got {}x{}",
                self.gui_size.0, self.gui_size.1
            )));
        }

        Ok(())
    }
}
