//! Unified inpainting processor
//!
//! This module provides the `InpaintProcessor` that owns the model handle and
//! runs the per-request pipeline: decode, resize, normalize, inpaint, encode.
//! The HTTP layer and tests drive the same code path.

use crate::{
    config::{InpaintConfig, ModelKind},
    error::Result,
    inference::{BackendFactory, DefaultBackendFactory},
    models::{create_model, InpaintModel},
    services::ImageCodec,
    types::{InpaintResult, ProcessingTimings, SizeLimit},
    utils::{ImagePreprocessor, TensorValidator},
};
use image::{GrayImage, RgbImage};
use instant::Instant;
use log::{debug, info};
use tracing::{info as trace_info, instrument};

/// Releases the model's cached runtime resources when dropped
///
/// Created right before inference so the release runs on success, on error
/// and on unwinding alike.
struct CacheReleaseGuard<'a> {
    model: &'a mut dyn InpaintModel,
}

impl<'a> CacheReleaseGuard<'a> {
    fn new(model: &'a mut dyn InpaintModel) -> Self {
        Self { model }
    }

    fn model(&mut self) -> &mut dyn InpaintModel {
        self.model
    }
}

impl Drop for CacheReleaseGuard<'_> {
    fn drop(&mut self) {
        self.model.release_cache();
        debug!("Released model cache");
    }
}

/// Processor owning the single model handle of the server
pub struct InpaintProcessor {
    config: InpaintConfig,
    model: Box<dyn InpaintModel>,
}

impl std::fmt::Debug for InpaintProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InpaintProcessor")
            .field("model", &self.model.kind())
            .field("config", &self.config)
            .finish()
    }
}

impl InpaintProcessor {
    /// Build the configured model with the compiled-in backends
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Model loading failures
    pub fn new(config: InpaintConfig) -> Result<Self> {
        Self::with_factory(config, &DefaultBackendFactory)
    }

    /// Build the configured model with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Model loading failures
    pub fn with_factory(config: InpaintConfig, factory: &dyn BackendFactory) -> Result<Self> {
        info!(
            "Initializing {} model on {} backend ({} device)",
            config.model, config.backend_type, config.execution_provider
        );
        let model = create_model(&config, factory)?;
        Ok(Self { config, model })
    }

    /// Wrap an already constructed model
    #[must_use]
    pub fn with_model(model: Box<dyn InpaintModel>, config: InpaintConfig) -> Self {
        Self { config, model }
    }

    #[must_use]
    pub fn config(&self) -> &InpaintConfig {
        &self.config
    }

    #[must_use]
    pub fn model_kind(&self) -> ModelKind {
        self.model.kind()
    }

    /// Run the full request pipeline on raw upload bytes
    ///
    /// # Errors
    /// - `Decode` for unreadable image or mask bytes
    /// - `Validation` for a bad size limit or mismatched dimensions
    /// - `Inference` for model failures
    pub fn process_request(
        &mut self,
        image_bytes: &[u8],
        mask_bytes: &[u8],
        size_limit: &str,
    ) -> Result<InpaintResult> {
        let decode_start = Instant::now();
        let image = ImageCodec::decode_rgb(image_bytes)?;
        let mask = ImageCodec::decode_mask(mask_bytes)?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        let size_limit: SizeLimit = size_limit.parse()?;
        let mut result = self.process_images(&image, &mask, size_limit)?;
        result.timings.decode_ms = decode_ms;
        result.timings.total_ms += decode_ms;
        Ok(result)
    }

    /// Run the pipeline on decoded rasters
    ///
    /// # Errors
    /// - `Validation` for mismatched image and mask dimensions
    /// - `Inference` for model failures
    #[instrument(skip(self, image, mask), fields(model = %self.model.kind()))]
    pub fn process_images(
        &mut self,
        image: &RgbImage,
        mask: &GrayImage,
        size_limit: SizeLimit,
    ) -> Result<InpaintResult> {
        let total_start = Instant::now();
        let original_dimensions = image.dimensions();

        if mask.dimensions() != original_dimensions {
            return Err(crate::error::InpaintError::validation(format!(
                "Image and mask dimensions differ: image {}x{}, mask {}x{}",
                original_dimensions.0,
                original_dimensions.1,
                mask.width(),
                mask.height()
            )));
        }
        if original_dimensions.0 == 0 || original_dimensions.1 == 0 {
            return Err(crate::error::InpaintError::validation(format!(
                "Image has no pixels: {}x{}",
                original_dimensions.0, original_dimensions.1
            )));
        }

        let limit = size_limit.resolve(original_dimensions.0, original_dimensions.1);
        info!(
            "Origin image shape: ({}, {}, 3)",
            original_dimensions.1, original_dimensions.0
        );

        let preprocess_start = Instant::now();
        let interpolation = self.config.interpolation;
        let image = ImagePreprocessor::resize_to_limit(image, limit, interpolation);
        let mask = ImagePreprocessor::resize_to_limit(mask, limit, interpolation);
        let processed_dimensions = image.dimensions();
        info!(
            "Resized image shape: ({}, {}, 3)",
            processed_dimensions.1, processed_dimensions.0
        );
        // The upper bound applies to what the model sees, not to the upload
        TensorValidator::validate_image_dimensions(processed_dimensions.0, processed_dimensions.1)?;

        let image_tensor = ImagePreprocessor::normalize_image(&image);
        let mask_tensor = ImagePreprocessor::normalize_mask(&mask);
        let preprocess_ms = preprocess_start.elapsed().as_millis() as u64;

        let inference_start = Instant::now();
        let output = {
            let mut guard = CacheReleaseGuard::new(self.model.as_mut());
            guard.model().inpaint(&image_tensor, &mask_tensor)
        };
        let inference_ms = inference_start.elapsed().as_millis() as u64;
        info!("process time: {}ms", inference_ms);
        trace_info!(inference_ms, "inference finished");

        let image = output?;
        Ok(InpaintResult {
            image,
            original_dimensions,
            processed_dimensions,
            timings: ProcessingTimings {
                decode_ms: 0,
                preprocess_ms,
                inference_ms,
                encode_ms: 0,
                total_ms: total_start.elapsed().as_millis() as u64,
            },
        })
    }

    /// Run the pipeline and encode the result as JPEG
    ///
    /// # Errors
    /// See [`InpaintProcessor::process_request`]
    pub fn process_to_jpeg(
        &mut self,
        image_bytes: &[u8],
        mask_bytes: &[u8],
        size_limit: &str,
    ) -> Result<Vec<u8>> {
        let result = self.process_request(image_bytes, mask_bytes, size_limit)?;
        let encode_start = Instant::now();
        let bytes = result.to_jpeg_bytes(self.config.jpeg_quality)?;
        debug!(
            "Encoded {}x{} JPEG ({} bytes) in {}ms, request total {}ms",
            result.processed_dimensions.0,
            result.processed_dimensions.1,
            bytes.len(),
            encode_start.elapsed().as_millis(),
            result.timings.total_ms
        );
        Ok(bytes)
    }
}
