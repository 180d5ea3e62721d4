//! Inference backend abstraction and factory

use crate::{
    config::InpaintConfig,
    error::{InpaintError, Result},
};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// A single named-by-position graph input
#[derive(Debug, Clone)]
pub enum BackendInput {
    Float(ArrayD<f32>),
    Int(ArrayD<i64>),
}

impl BackendInput {
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float(array) => array.shape(),
            Self::Int(array) => array.shape(),
        }
    }
}

impl From<ArrayD<f32>> for BackendInput {
    fn from(array: ArrayD<f32>) -> Self {
        Self::Float(array)
    }
}

impl From<ArrayD<i64>> for BackendInput {
    fn from(array: ArrayD<i64>) -> Self {
        Self::Int(array)
    }
}

/// Trait for inference backends
pub trait InferenceBackend: Send {
    /// Load the graph and prepare the runtime session
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Model loading or parsing errors
    /// - Invalid configuration parameters
    fn initialize(&mut self, config: &InpaintConfig) -> Result<Option<Duration>>;

    /// Run the graph on the given inputs and return its first output
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Tensor conversion errors
    fn infer(&mut self, inputs: &[BackendInput]) -> Result<ArrayD<f32>>;

    /// Free cached runtime resources (compiled plans, device arena blocks)
    fn release_cache(&mut self);

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Backend type enumeration for runtime selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            other => Err(InpaintError::invalid_config(format!(
                "Unknown backend: {}. Supported: onnx, tract",
                other
            ))),
        }
    }
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an initialized backend for the graph stored at `model_path`
    ///
    /// # Errors
    /// - Backend type not compiled in
    /// - Model loading errors
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_path: &Path,
        config: &InpaintConfig,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends compiled into this build
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_path: &Path,
        config: &InpaintConfig,
    ) -> Result<Box<dyn InferenceBackend>> {
        let mut backend: Box<dyn InferenceBackend> = match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Box::new(crate::backends::OnnxBackend::new(model_path)),
            #[cfg(feature = "tract")]
            BackendType::Tract => Box::new(crate::backends::TractBackend::new(model_path)),
            #[allow(unreachable_patterns)]
            other => {
                return Err(InpaintError::invalid_config(format!(
                    "{} backend not compiled into this build",
                    other
                )))
            },
        };

        let load_time = backend.initialize(config)?;
        if let Some(elapsed) = load_time {
            log::debug!(
                "Loaded {} in {:.2}s",
                model_path.display(),
                elapsed.as_secs_f64()
            );
        }
        Ok(backend)
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}
