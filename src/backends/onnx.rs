//! ONNX Runtime backend implementation for inpainting graphs
//!
//! Runs a single ONNX graph with support for multiple execution providers
//! (CPU, CUDA, `CoreML`). The CUDA arena grows by request size and can be
//! shrunk back at the end of each run.

use crate::config::{ExecutionProvider, InpaintConfig};
use crate::error::{InpaintError, Result};
use crate::inference::{BackendInput, InferenceBackend};
use ndarray::ArrayD;
use ort::execution_providers::{
    ArenaExtendStrategy, CUDAExecutionProvider, CoreMLExecutionProvider,
    ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, RunOptions, Session};
use ort::value::{DynValue, Value};
use std::path::{Path, PathBuf};

/// ONNX Runtime backend for one graph file
pub struct OnnxBackend {
    model_path: PathBuf,
    session: Option<Session>,
    run_options: Option<RunOptions>,
    active_provider: &'static str,
    initialized: bool,
}

// `RunOptions` does not implement `Debug`, so it is reported by presence only.
impl std::fmt::Debug for OnnxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxBackend")
            .field("model_path", &self.model_path)
            .field("session", &self.session)
            .field("run_options", &self.run_options.is_some())
            .field("active_provider", &self.active_provider)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl OnnxBackend {
    /// List all ONNX Runtime execution providers with availability status and descriptions
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("🔍 System Hardware Analysis:");
        log::debug!("  - Platform: {os}", os = std::env::consts::OS);
        log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create a backend for the graph at `model_path`; nothing is loaded until `initialize`
    #[must_use]
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            session: None,
            run_options: None,
            active_provider: "CPU",
            initialized: false,
        }
    }

    fn cuda_provider() -> CUDAExecutionProvider {
        CUDAExecutionProvider::default().with_arena_extend_strategy(ArenaExtendStrategy::SameAsRequested)
    }

    /// Attach execution providers according to the requested device, falling back to CPU
    fn configure_providers(
        &mut self,
        builder: ort::session::builder::SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<ort::session::builder::SessionBuilder> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        let builder = match provider {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if cuda_available {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(Self::cuda_provider().build());
                    self.active_provider = "CUDA";
                } else if coreml_available {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                    self.active_provider = "CoreML";
                }

                if providers.is_empty() {
                    log::warn!("⚠️ No hardware acceleration available, falling back to CPU");
                    builder
                } else {
                    builder.with_execution_providers(providers).map_err(|e| {
                        InpaintError::inference(format!(
                            "Failed to set auto execution providers: {e}"
                        ))
                    })?
                }
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                builder
            },
            ExecutionProvider::Cuda => {
                if cuda_available {
                    log::info!("Using CUDA execution provider");
                    self.active_provider = "CUDA";
                    builder
                        .with_execution_providers([Self::cuda_provider().build()])
                        .map_err(|e| {
                            InpaintError::inference(format!(
                                "Failed to set CUDA execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                    builder
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                    self.active_provider = "CoreML";
                    builder
                        .with_execution_providers([CoreMLExecutionProvider::default()
                            .with_subgraphs(true)
                            .build()])
                        .map_err(|e| {
                            InpaintError::inference(format!(
                                "Failed to set CoreML execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!("🚫 CoreML execution provider requested but not available");
                    log::warn!("  - Falling back to CPU (will be much slower)");
                    builder
                }
            },
        };

        Ok(builder)
    }

    /// Run options that shrink the memory arenas once the run completes
    fn shrinking_run_options(active_provider: &str) -> Result<RunOptions> {
        let arenas = if active_provider == "CUDA" {
            "cpu:0;gpu:0"
        } else {
            "cpu:0"
        };
        let mut options = RunOptions::new().map_err(|e| {
            InpaintError::inference(format!("Failed to create run options: {e}"))
        })?;
        options
            .add_config_entry("memory.enable_memory_arena_shrinkage", arenas)
            .map_err(|e| InpaintError::inference(format!("Failed to configure run options: {e}")))?;
        Ok(options)
    }

    fn load_model(&mut self, config: &InpaintConfig) -> Result<std::time::Duration> {
        let model_load_start = std::time::Instant::now();

        if !self.model_path.is_file() {
            return Err(InpaintError::model(format!(
                "Model file not found: {}",
                self.model_path.display()
            )));
        }

        let session_builder = Session::builder()
            .map_err(|e| InpaintError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                InpaintError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let session_builder = self.configure_providers(session_builder, config.execution_provider)?;

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(8)
        };

        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(8)
                / 4)
            .max(1)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| InpaintError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| InpaintError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_file(&self.model_path)
            .map_err(|e| {
                InpaintError::model(format!(
                    "Failed to create session from {}: {e}",
                    self.model_path.display()
                ))
            })?;

        log::debug!("✅ ONNX Runtime session created successfully");
        log::debug!("  - Model: {}", self.model_path.display());
        log::debug!("  - Requested provider: {:?}", config.execution_provider);
        log::debug!("  - Active provider: {}", self.active_provider);
        log::debug!(
            "  - Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads"
        );

        self.run_options = if config.release_device_memory {
            Some(Self::shrinking_run_options(self.active_provider)?)
        } else {
            None
        };
        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );

        Ok(model_load_time)
    }

    fn to_value(input: &BackendInput) -> Result<DynValue> {
        let value = match input {
            BackendInput::Float(array) => Value::from_array(array.clone()).map(Value::into_dyn),
            BackendInput::Int(array) => Value::from_array(array.clone()).map(Value::into_dyn),
        };
        value.map_err(|e| InpaintError::inference(format!("Failed to convert input tensor: {e}")))
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &InpaintConfig) -> Result<Option<std::time::Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, inputs: &[BackendInput]) -> Result<ArrayD<f32>> {
        use std::time::Instant;

        if !self.initialized {
            return Err(InpaintError::internal("Backend not initialized"));
        }

        let provider = self.active_provider;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| InpaintError::internal("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!(
            "🚀 Starting inference with input shapes: {:?}",
            inputs.iter().map(BackendInput::shape).collect::<Vec<_>>()
        );

        let values = inputs
            .iter()
            .map(Self::to_value)
            .collect::<Result<Vec<_>>>()?;

        let run_error = |e: ort::Error| {
            InpaintError::inference_error_with_provider(provider, "ONNX inference", &e.to_string())
        };

        // Positional inputs; every graph used here takes one or two tensors
        let mut values = values.into_iter();
        let outputs = match (values.next(), values.next(), values.next()) {
            (Some(first), None, None) => match &self.run_options {
                Some(options) => session.run_with_options(ort::inputs![first], options),
                None => session.run(ort::inputs![first]),
            },
            (Some(first), Some(second), None) => match &self.run_options {
                Some(options) => session.run_with_options(ort::inputs![first, second], options),
                None => session.run(ort::inputs![first, second]),
            },
            _ => {
                return Err(InpaintError::inference(format!(
                    "Unsupported number of graph inputs: {}",
                    inputs.len()
                )))
            },
        }
        .map_err(run_error)?;

        let output = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| InpaintError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| InpaintError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    InpaintError::inference(format!("Failed to extract output tensor: {e}"))
                })?
                .to_owned()
        };

        log::debug!(
            "📊 Inference complete: {:.2}ms total, output shape {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            output.shape()
        );

        Ok(output)
    }

    fn release_cache(&mut self) {
        // Arena shrinkage is attached to every run through the run options
        if self.run_options.is_some() {
            log::trace!("Memory arenas shrink at the end of each run ({})", self.active_provider);
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
