//! Shared image preprocessing utilities
//!
//! Resizing to a size limit, conversion between `u8` rasters and `[C,H,W]`
//! float tensors, symmetric padding and mask compositing.

use crate::{
    error::{InpaintError, Result},
    types::Interpolation,
};
use image::{imageops, GrayImage, ImageBuffer, Luma, Pixel, RgbImage};
use ndarray::{s, Array3, ArrayView3, Axis, Zip};

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Dimensions after scaling the longer side down to `limit`
    ///
    /// Rounds half up and never returns a zero dimension.
    #[must_use]
    pub fn scaled_dimensions(width: u32, height: u32, limit: u32) -> (u32, u32) {
        let longest = width.max(height);
        if longest <= limit {
            return (width, height);
        }

        let ratio = f64::from(limit) / f64::from(longest);
        let scale = |side: u32| ((f64::from(side) * ratio + 0.5).floor() as u32).max(1);
        (scale(width), scale(height))
    }

    /// Downscale so the longer side is at most `limit`; never upscales
    #[must_use]
    pub fn resize_to_limit<P>(
        img: &ImageBuffer<P, Vec<P::Subpixel>>,
        limit: u32,
        interpolation: Interpolation,
    ) -> ImageBuffer<P, Vec<P::Subpixel>>
    where
        P: Pixel + 'static,
    {
        let (width, height) = img.dimensions();
        let (new_width, new_height) = Self::scaled_dimensions(width, height, limit);
        if (new_width, new_height) == (width, height) {
            return img.clone();
        }

        imageops::resize(img, new_width, new_height, interpolation.filter_type())
    }

    /// RGB raster to `[3,H,W]` in `[0,1]`
    #[must_use]
    pub fn normalize_image(img: &RgbImage) -> Array3<f32> {
        let (width, height) = img.dimensions();
        let mut tensor = Array3::<f32>::zeros((3, height as usize, width as usize));
        for (x, y, pixel) in img.enumerate_pixels() {
            for (channel, value) in pixel.0.iter().enumerate() {
                tensor[[channel, y as usize, x as usize]] = f32::from(*value) / 255.0;
            }
        }
        tensor
    }

    /// Grayscale raster to `[1,H,W]` in `[0,1]`
    #[must_use]
    pub fn normalize_mask(mask: &GrayImage) -> Array3<f32> {
        let (width, height) = mask.dimensions();
        let mut tensor = Array3::<f32>::zeros((1, height as usize, width as usize));
        for (x, y, pixel) in mask.enumerate_pixels() {
            tensor[[0, y as usize, x as usize]] = f32::from(pixel.0[0]) / 255.0;
        }
        tensor
    }

    /// `[3,H,W]` tensor in `[0,1]` back to an RGB raster (clamped, rounded)
    ///
    /// # Errors
    /// - Tensor is not three-channel
    pub fn tensor_to_rgb(tensor: &Array3<f32>) -> Result<RgbImage> {
        let (channels, height, width) = tensor.dim();
        if channels != 3 {
            return Err(InpaintError::inference(format!(
                "Expected a 3-channel output tensor, got {channels} channels"
            )));
        }

        Ok(RgbImage::from_fn(width as u32, height as u32, |x, y| {
            let (x, y) = (x as usize, y as usize);
            let to_u8 = |c: usize| (tensor[[c, y, x]].clamp(0.0, 1.0) * 255.0).round() as u8;
            image::Rgb([to_u8(0), to_u8(1), to_u8(2)])
        }))
    }

    /// Source index for position `i` of a symmetric (edge-repeating) extension of length `n`
    fn symmetric_index(i: usize, n: usize) -> usize {
        let period = 2 * n;
        let j = i % period;
        if j < n {
            j
        } else {
            period - 1 - j
        }
    }

    /// Pad bottom and right to `(height, width)` by symmetric reflection
    #[must_use]
    pub fn pad_symmetric(tensor: &Array3<f32>, height: usize, width: usize) -> Array3<f32> {
        let (channels, src_h, src_w) = tensor.dim();
        if (src_h, src_w) == (height, width) || src_h == 0 || src_w == 0 {
            return tensor.clone();
        }

        Array3::from_shape_fn((channels, height, width), |(c, y, x)| {
            tensor[[
                c,
                Self::symmetric_index(y, src_h),
                Self::symmetric_index(x, src_w),
            ]]
        })
    }

    /// Smallest multiple of `modulo` that is `>= value`
    #[must_use]
    pub fn ceil_modulo(value: usize, modulo: usize) -> usize {
        if modulo == 0 || value % modulo == 0 {
            value
        } else {
            (value / modulo + 1) * modulo
        }
    }

    /// Pad so height and width become multiples of `modulo`
    #[must_use]
    pub fn pad_to_modulo(tensor: &Array3<f32>, modulo: usize) -> Array3<f32> {
        let (_, height, width) = tensor.dim();
        Self::pad_symmetric(
            tensor,
            Self::ceil_modulo(height, modulo),
            Self::ceil_modulo(width, modulo),
        )
    }

    /// Resample every channel of a `[C,H,W]` tensor to `(height, width)`
    #[must_use]
    pub fn resize_tensor(
        tensor: ArrayView3<'_, f32>,
        height: usize,
        width: usize,
        interpolation: Interpolation,
    ) -> Array3<f32> {
        let (channels, src_h, src_w) = tensor.dim();
        if (src_h, src_w) == (height, width) {
            return tensor.to_owned();
        }

        let mut output = Array3::<f32>::zeros((channels, height, width));
        for c in 0..channels {
            let plane: ImageBuffer<Luma<f32>, Vec<f32>> =
                ImageBuffer::from_fn(src_w as u32, src_h as u32, |x, y| {
                    Luma([tensor[[c, y as usize, x as usize]]])
                });
            let resized = imageops::resize(
                &plane,
                width as u32,
                height as u32,
                interpolation.filter_type(),
            );
            for (x, y, pixel) in resized.enumerate_pixels() {
                output[[c, y as usize, x as usize]] = pixel.0[0];
            }
        }
        output
    }

    /// Fit inside a `size x size` square keeping aspect ratio, then reflect-pad
    ///
    /// Returns the padded tensor and the `(height, width)` of the content region.
    #[must_use]
    pub fn letterbox(
        tensor: &Array3<f32>,
        size: usize,
        interpolation: Interpolation,
    ) -> (Array3<f32>, (usize, usize)) {
        let (_, height, width) = tensor.dim();
        let longest = height.max(width).max(1);
        let scale = |side: usize| ((side * size) as f64 / longest as f64).round().max(1.0) as usize;
        let (new_h, new_w) = (scale(height).min(size), scale(width).min(size));

        let resized = Self::resize_tensor(tensor.view(), new_h, new_w, interpolation);
        (Self::pad_symmetric(&resized, size, size), (new_h, new_w))
    }

    /// Undo `letterbox`: crop the content region and resize to `(height, width)`
    #[must_use]
    pub fn unletterbox(
        tensor: &Array3<f32>,
        content: (usize, usize),
        height: usize,
        width: usize,
        interpolation: Interpolation,
    ) -> Array3<f32> {
        let cropped = tensor.slice(s![.., ..content.0, ..content.1]);
        Self::resize_tensor(cropped, height, width, interpolation)
    }

    /// Binarize a `[1,H,W]` mask: values above `threshold` become 1
    #[must_use]
    pub fn binarize_mask(mask: &Array3<f32>, threshold: f32) -> Array3<f32> {
        mask.mapv(|v| if v > threshold { 1.0 } else { 0.0 })
    }

    /// Keep `original` outside the mask and `inpainted` inside it
    ///
    /// # Errors
    /// - Shapes of the three tensors disagree
    pub fn composite(
        original: &Array3<f32>,
        inpainted: &Array3<f32>,
        mask: &Array3<f32>,
    ) -> Result<Array3<f32>> {
        let (_, height, width) = original.dim();
        if inpainted.dim() != original.dim() || mask.dim() != (1, height, width) {
            return Err(InpaintError::inference(format!(
                "Cannot composite output {:?} onto input {:?} with mask {:?}",
                inpainted.dim(),
                original.dim(),
                mask.dim()
            )));
        }

        let mask_plane = mask.index_axis(Axis(0), 0);
        let mut result = original.clone();
        for (mut out, fill) in result.outer_iter_mut().zip(inpainted.outer_iter()) {
            Zip::from(&mut out)
                .and(&fill)
                .and(&mask_plane)
                .for_each(|o, &f, &m| *o = (1.0 - m) * *o + m * f);
        }
        Ok(result)
    }
}
