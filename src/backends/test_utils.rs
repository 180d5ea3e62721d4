//! Test utilities and mock backends for testing inference functionality
//!
//! Mock implementations of `InferenceBackend` that mimic the tensor contracts
//! of the LaMa and LDM graphs, so models can be exercised without weights or
//! an inference runtime.

use crate::{
    config::InpaintConfig,
    error::{InpaintError, Result},
    inference::{BackendFactory, BackendInput, BackendType, InferenceBackend},
};
use instant::Duration;
use ndarray::{s, ArrayD, IxDyn};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Spatial downscale of the mock LDM autoencoder
pub const MOCK_LATENT_SCALE: usize = 4;

/// What a mock graph computes from its inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// `(image, mask) -> image` with masked pixels replaced by `fill`
    Inpaint { fill: f32 },
    /// `image[1,3,H,W] -> latent[1,3,H/4,W/4]` by strided sampling
    Encode,
    /// `latent[1,3,h,w] -> image[1,3,4h,4w]` by nearest upsampling
    Decode,
    /// `(cat(x, c)[1,7,h,w], t) -> zeros[1,3,h,w]`
    Denoise,
}

/// Mock backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    behavior: MockBehavior,
    initialized: bool,
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_inference: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::Inpaint { fill: 1.0 })
    }

    #[must_use]
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            initialized: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_inference: false,
        }
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new();
        backend.should_fail_inference = true;
        backend
    }

    /// Share a call history with other mocks
    #[must_use]
    pub fn with_history(mut self, history: Arc<Mutex<Vec<String>>>) -> Self {
        self.call_history = history;
        self
    }

    /// Mark the backend initialized without going through `initialize`
    #[must_use]
    pub fn initialized(mut self) -> Self {
        self.initialized = true;
        self
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn float_input(inputs: &[BackendInput], index: usize) -> Result<&ArrayD<f32>> {
        match inputs.get(index) {
            Some(BackendInput::Float(array)) if array.ndim() == 4 => Ok(array),
            _ => Err(InpaintError::inference(format!(
                "Mock backend expects a 4D float tensor at input {index}"
            ))),
        }
    }

    fn generate_mock_output(&self, inputs: &[BackendInput]) -> Result<ArrayD<f32>> {
        match self.behavior {
            MockBehavior::Inpaint { fill } => {
                let image = Self::float_input(inputs, 0)?;
                let mask = Self::float_input(inputs, 1)?;
                let mut output = image.clone();
                for channel in 0..output.shape()[1] {
                    let mut plane = output.slice_mut(s![0, channel, .., ..]);
                    let mask_plane = mask.slice(s![0, 0, .., ..]);
                    plane.zip_mut_with(&mask_plane, |value, &m| {
                        if m > 0.0 {
                            *value = fill;
                        }
                    });
                }
                Ok(output)
            },
            MockBehavior::Encode => {
                let image = Self::float_input(inputs, 0)?;
                Ok(image
                    .slice(s![.., .., ..;MOCK_LATENT_SCALE, ..;MOCK_LATENT_SCALE])
                    .to_owned()
                    .into_dyn())
            },
            MockBehavior::Decode => {
                let latent = Self::float_input(inputs, 0)?;
                let (h, w) = (latent.shape()[2], latent.shape()[3]);
                let mut output = ArrayD::<f32>::zeros(IxDyn(&[
                    1,
                    3,
                    h * MOCK_LATENT_SCALE,
                    w * MOCK_LATENT_SCALE,
                ]));
                for ((_, c, y, x), value) in output
                    .view_mut()
                    .into_dimensionality::<ndarray::Ix4>()
                    .map_err(|e| InpaintError::inference(e.to_string()))?
                    .indexed_iter_mut()
                {
                    *value = latent[[0, c, y / MOCK_LATENT_SCALE, x / MOCK_LATENT_SCALE]];
                }
                Ok(output)
            },
            MockBehavior::Denoise => {
                let x = Self::float_input(inputs, 0)?;
                if !matches!(inputs.get(1), Some(BackendInput::Int(_))) {
                    return Err(InpaintError::inference("Mock denoiser expects an i64 timestep"));
                }
                let (h, w) = (x.shape()[2], x.shape()[3]);
                Ok(ArrayD::<f32>::zeros(IxDyn(&[1, 3, h, w])))
            },
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &InpaintConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");
        self.initialized = true;
        Ok(Some(Duration::from_millis(5)))
    }

    fn infer(&mut self, inputs: &[BackendInput]) -> Result<ArrayD<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(InpaintError::inference("Mock backend not initialized"));
        }

        if self.should_fail_inference {
            return Err(InpaintError::inference("Mock backend inference failed"));
        }

        self.generate_mock_output(inputs)
    }

    fn release_cache(&mut self) {
        self.record_call("release_cache");
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out mocks keyed on the graph file name
#[derive(Debug, Clone, Default)]
pub struct MockBackendFactory {
    pub call_history: Arc<Mutex<Vec<String>>>,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        model_path: &Path,
        config: &InpaintConfig,
    ) -> Result<Box<dyn InferenceBackend>> {
        let name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let behavior = if name.contains("encode") {
            MockBehavior::Encode
        } else if name.contains("decode") {
            MockBehavior::Decode
        } else if name.contains("diffusion") {
            MockBehavior::Denoise
        } else {
            MockBehavior::Inpaint { fill: 1.0 }
        };

        let mut backend =
            MockBackend::with_behavior(behavior).with_history(Arc::clone(&self.call_history));
        backend.initialize(config)?;
        Ok(Box::new(backend))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_inpaint_fills_masked_pixels() {
        let mut backend = MockBackend::with_behavior(MockBehavior::Inpaint { fill: 0.75 }).initialized();
        let image = ArrayD::<f32>::from_elem(IxDyn(&[1, 3, 4, 4]), 0.1);
        let mut mask = ArrayD::<f32>::zeros(IxDyn(&[1, 1, 4, 4]));
        mask[[0, 0, 1, 2]] = 1.0;

        let output = backend
            .infer(&[BackendInput::Float(image), BackendInput::Float(mask)])
            .unwrap();
        assert_eq!(output[[0, 2, 1, 2]], 0.75);
        assert_eq!(output[[0, 2, 0, 0]], 0.1);
    }

    #[test]
    fn test_mock_autoencoder_shapes() {
        let mut encoder = MockBackend::with_behavior(MockBehavior::Encode).initialized();
        let mut decoder = MockBackend::with_behavior(MockBehavior::Decode).initialized();
        let image = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 32, 64]));

        let latent = encoder.infer(&[BackendInput::Float(image)]).unwrap();
        assert_eq!(latent.shape(), &[1, 3, 8, 16]);

        let decoded = decoder.infer(&[BackendInput::Float(latent)]).unwrap();
        assert_eq!(decoded.shape(), &[1, 3, 32, 64]);
    }

    #[test]
    fn test_failing_mock_records_history() {
        let mut backend = MockBackend::new_failing_inference().initialized();
        let image = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 4, 4]));
        assert!(backend.infer(&[BackendInput::Float(image)]).is_err());
        backend.release_cache();
        assert_eq!(backend.get_call_history(), vec!["infer", "release_cache"]);
    }
}
