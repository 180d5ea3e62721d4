//! Tensor validation utilities
//!
//! Shape checks for the `[C,H,W]` tensors handed to inpainting models.

use crate::error::{InpaintError, Result};
use ndarray::Array3;

/// Validator for tensor operations and shape validation
pub struct TensorValidator;

impl TensorValidator {
    /// Image must be `[3,H,W]` and mask `[1,H,W]` with the same `H,W`
    pub fn validate_inpaint_inputs(image: &Array3<f32>, mask: &Array3<f32>) -> Result<()> {
        let (image_channels, image_h, image_w) = image.dim();
        let (mask_channels, mask_h, mask_w) = mask.dim();

        if image_channels != 3 {
            return Err(InpaintError::validation(format!(
                "Image tensor must have 3 channels, got {image_channels}"
            )));
        }

        if mask_channels != 1 {
            return Err(InpaintError::validation(format!(
                "Mask tensor must have 1 channel, got {mask_channels}"
            )));
        }

        if (image_h, image_w) != (mask_h, mask_w) {
            return Err(InpaintError::validation(format!(
                "Image and mask dimensions differ: image {image_w}x{image_h}, mask {mask_w}x{mask_h}"
            )));
        }

        Self::validate_image_dimensions(image_w as u32, image_h as u32)
    }

    /// Validate image dimensions are within reasonable bounds
    pub fn validate_image_dimensions(width: u32, height: u32) -> Result<()> {
        const MAX_DIMENSION: u32 = 16384; // 16K pixels
        const MIN_DIMENSION: u32 = 1;

        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(InpaintError::validation(format!(
                "Image dimensions too small: {}x{}. Minimum: {}x{}",
                width, height, MIN_DIMENSION, MIN_DIMENSION
            )));
        }

        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(InpaintError::validation(format!(
                "Image dimensions too large: {}x{}. Maximum: {}x{}",
                width, height, MAX_DIMENSION, MAX_DIMENSION
            )));
        }

        Ok(())
    }

    /// Model outputs must be `[1,C,H,W]`; returns `(C,H,W)`
    pub fn validate_batched_output(shape: &[usize]) -> Result<(usize, usize, usize)> {
        match shape {
            [1, channels, height, width] => Ok((*channels, *height, *width)),
            other => Err(InpaintError::inference(format!(
                "Expected a [1,C,H,W] output tensor, got {other:?}"
            ))),
        }
    }
}
