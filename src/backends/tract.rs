//! Tract backend implementation for inpainting graphs
//!
//! Tract is a pure Rust inference engine. Inpainting graphs take images of
//! arbitrary size, so the parsed graph is kept and a runnable plan is compiled
//! for each concrete set of input shapes. A small cache keeps the most recent
//! plans; `release_cache` drops them.

use crate::config::InpaintConfig;
use crate::error::{InpaintError, Result};
use crate::inference::{BackendInput, InferenceBackend};
use ndarray::ArrayD;
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Plans kept per backend before the least recently used one is evicted
const PLAN_CACHE_CAPACITY: usize = 4;

type ShapeKey = Vec<Vec<usize>>;

/// Tract backend for one graph file
#[derive(Debug)]
pub struct TractBackend {
    model_path: PathBuf,
    model: Option<InferenceModel>,
    plans: Vec<(ShapeKey, TractModel)>,
    initialized: bool,
}

impl TractBackend {
    /// Create a backend for the graph at `model_path`; nothing is parsed until `initialize`
    #[must_use]
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            model: None,
            plans: Vec::new(),
            initialized: false,
        }
    }

    /// Number of compiled plans currently held
    #[must_use]
    pub fn cached_plans(&self) -> usize {
        self.plans.len()
    }

    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();

        if !self.model_path.is_file() {
            return Err(InpaintError::model(format!(
                "Model file not found: {}",
                self.model_path.display()
            )));
        }

        log::info!("🚀 Initializing Tract Backend");
        log::info!("🧠 Model: {}", self.model_path.display());

        let model = onnx()
            .model_for_path(&self.model_path)
            .map_err(|e| InpaintError::model(format!("Failed to load ONNX model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "✅ Tract backend initialized in {:.2}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }

    /// Compile a runnable plan for the given input shapes
    fn compile(model: &InferenceModel, inputs: &[BackendInput]) -> Result<TractModel> {
        let compile_start = Instant::now();
        let mut typed = model.clone();
        for (index, input) in inputs.iter().enumerate() {
            let datum = match input {
                BackendInput::Float(_) => f32::datum_type(),
                BackendInput::Int(_) => i64::datum_type(),
            };
            typed = typed
                .with_input_fact(index, InferenceFact::dt_shape(datum, input.shape().to_vec()))
                .map_err(|e| {
                    InpaintError::inference(format!("Failed to set input fact {index}: {e}"))
                })?;
        }

        let plan = typed
            .into_optimized()
            .map_err(|e| InpaintError::inference(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| InpaintError::inference(format!("Failed to create runnable model: {e}")))?;

        log::debug!(
            "Compiled Tract plan in {:.2}ms",
            compile_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(plan)
    }

    /// Fetch (or compile) the plan for these shapes and move it to the front
    fn plan_for(&mut self, inputs: &[BackendInput]) -> Result<&TractModel> {
        let key: ShapeKey = inputs.iter().map(|input| input.shape().to_vec()).collect();

        if let Some(position) = self.plans.iter().position(|(shape, _)| *shape == key) {
            let entry = self.plans.remove(position);
            self.plans.insert(0, entry);
        } else {
            let model = self
                .model
                .as_ref()
                .ok_or_else(|| InpaintError::inference("Tract model not initialized"))?;
            let plan = Self::compile(model, inputs)?;
            self.plans.insert(0, (key, plan));
            self.plans.truncate(PLAN_CACHE_CAPACITY);
        }

        self.plans
            .first()
            .map(|(_, plan)| plan)
            .ok_or_else(|| InpaintError::internal("Plan cache unexpectedly empty"))
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, _config: &InpaintConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model()?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, inputs: &[BackendInput]) -> Result<ArrayD<f32>> {
        if !self.initialized {
            return Err(InpaintError::internal("Backend not initialized"));
        }

        log::debug!("🔮 Running Tract inference");
        let inference_start = Instant::now();

        let tensors: TVec<TValue> = inputs
            .iter()
            .map(|input| match input {
                BackendInput::Float(array) => Tensor::from(array.clone()).into(),
                BackendInput::Int(array) => Tensor::from(array.clone()).into(),
            })
            .collect();

        let plan = self.plan_for(inputs)?;
        let outputs = plan
            .run(tensors)
            .map_err(|e| InpaintError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| InpaintError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| InpaintError::inference(format!("Failed to convert output tensor: {e}")))?
            .to_owned();

        log::debug!(
            "✅ Tract inference completed in {:.2}ms, output shape {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            output.shape()
        );

        Ok(output)
    }

    fn release_cache(&mut self) {
        if !self.plans.is_empty() {
            log::debug!("Releasing {} compiled Tract plan(s)", self.plans.len());
            self.plans.clear();
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_starts_empty() {
        let backend = TractBackend::new("lama.onnx");
        assert!(!backend.is_initialized());
        assert_eq!(backend.cached_plans(), 0);
    }

    #[test]
    fn test_missing_model_file() {
        let mut backend = TractBackend::new("/nonexistent/lama.onnx");
        let err = backend.initialize(&InpaintConfig::default()).unwrap_err();
        assert!(matches!(err, InpaintError::Model(_)));
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_release_cache_on_empty_backend() {
        let mut backend = TractBackend::new("lama.onnx");
        backend.release_cache();
        assert_eq!(backend.cached_plans(), 0);
    }
}
