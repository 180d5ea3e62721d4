//! LaMa (large-mask inpainting) model
//!
//! Single forward pass per image. Large images switch to crop mode: each
//! painted region is inpainted inside a window around its bounding box and
//! pasted back, which bounds memory use by the size of the strokes.

use super::{to_batched, InpaintModel};
use crate::{
    config::{InpaintConfig, ModelKind},
    error::Result,
    inference::{BackendInput, InferenceBackend},
    types::Interpolation,
    utils::{boxes_from_mask, ImagePreprocessor, TensorValidator},
};
use image::RgbImage;
use ndarray::{s, Array3, Axis, Ix3};
use tracing::{debug, instrument};

/// Spatial stride of the network; dynamic-shape inputs are padded to it
pub const LAMA_PAD_MODULO: usize = 8;

/// LaMa inpainting model on top of an inference backend
pub struct LaMa {
    backend: Box<dyn InferenceBackend>,
    crop_trigger_size: [u32; 2],
    crop_margin: u32,
    input_size: Option<usize>,
    interpolation: Interpolation,
}

impl std::fmt::Debug for LaMa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaMa")
            .field("crop_trigger_size", &self.crop_trigger_size)
            .field("crop_margin", &self.crop_margin)
            .field("input_size", &self.input_size)
            .finish_non_exhaustive()
    }
}

impl LaMa {
    #[must_use]
    pub fn new(backend: Box<dyn InferenceBackend>, config: &InpaintConfig) -> Self {
        Self {
            backend,
            crop_trigger_size: config.crop_trigger_size,
            crop_margin: config.crop_margin,
            input_size: config.lama_input_size.map(|size| size as usize),
            interpolation: config.interpolation,
        }
    }

    /// Whether an image of this size is processed region by region
    #[must_use]
    pub fn uses_crop_mode(&self, height: usize, width: usize) -> bool {
        let trigger = self.crop_trigger_size[0] as usize * self.crop_trigger_size[1] as usize;
        height * width >= trigger
    }

    /// One forward pass; returns `[3,H,W]` composited onto `image`
    fn run(&mut self, image: &Array3<f32>, mask: &Array3<f32>) -> Result<Array3<f32>> {
        let (_, height, width) = image.dim();
        let mask = ImagePreprocessor::binarize_mask(mask, 0.0);

        let (image_in, mask_in, content) = match self.input_size {
            Some(size) => {
                let (image_in, content) =
                    ImagePreprocessor::letterbox(image, size, self.interpolation);
                let (mask_in, _) = ImagePreprocessor::letterbox(&mask, size, Interpolation::Nearest);
                (image_in, ImagePreprocessor::binarize_mask(&mask_in, 0.0), content)
            },
            None => (
                ImagePreprocessor::pad_to_modulo(image, LAMA_PAD_MODULO),
                ImagePreprocessor::pad_to_modulo(&mask, LAMA_PAD_MODULO),
                (height, width),
            ),
        };

        let output = self.backend.infer(&[
            BackendInput::Float(to_batched(image_in)),
            BackendInput::Float(to_batched(mask_in)),
        ])?;
        TensorValidator::validate_batched_output(output.shape())?;
        let mut output = output
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix3>()
            .map_err(|e| crate::error::InpaintError::inference(e.to_string()))?;

        // Some exports emit 0-255 instead of 0-1
        if output.iter().any(|&v| v > 1.5) {
            output.mapv_inplace(|v| v / 255.0);
        }

        let output = match self.input_size {
            Some(_) => {
                ImagePreprocessor::unletterbox(&output, content, height, width, self.interpolation)
            },
            None => output.slice(s![.., ..height, ..width]).to_owned(),
        };

        ImagePreprocessor::composite(image, &output, &mask)
    }

    /// Inpaint each mask region inside its own crop window
    fn run_cropped(&mut self, image: &Array3<f32>, mask: &Array3<f32>) -> Result<Array3<f32>> {
        let (_, height, width) = image.dim();
        let boxes = boxes_from_mask(mask);
        debug!(regions = boxes.len(), "crop mode triggered");

        let mut result = image.clone();
        for region in boxes {
            let (left, top, right, bottom) =
                region.crop_window(self.crop_margin as usize, height, width);
            debug!(left, top, right, bottom, "inpainting crop");

            let crop_image = image.slice(s![.., top..bottom, left..right]).to_owned();
            let crop_mask = mask.slice(s![.., top..bottom, left..right]).to_owned();
            let crop_result = self.run(&crop_image, &crop_mask)?;
            result
                .slice_mut(s![.., top..bottom, left..right])
                .assign(&crop_result);
        }
        Ok(result)
    }
}

impl InpaintModel for LaMa {
    #[instrument(skip_all, fields(shape = ?image.dim()))]
    fn inpaint(&mut self, image: &Array3<f32>, mask: &Array3<f32>) -> Result<RgbImage> {
        TensorValidator::validate_inpaint_inputs(image, mask)?;
        let (_, height, width) = image.dim();

        let result = if self.uses_crop_mode(height, width) {
            self.run_cropped(image, mask)?
        } else {
            self.run(image, mask)?
        };

        ImagePreprocessor::tensor_to_rgb(&result)
    }

    fn release_cache(&mut self) {
        self.backend.release_cache();
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Lama
    }
}
