//! Latent diffusion inpainting model
//!
//! Three graphs: an encoder for the masked image, a noise-predicting
//! denoiser run by the DDIM sampler, and a decoder back to pixel space.

use super::{ddim::DdimSampler, to_batched, InpaintModel};
use crate::{
    config::{InpaintConfig, ModelKind},
    error::{InpaintError, Result},
    inference::{BackendInput, InferenceBackend},
    utils::{ImagePreprocessor, TensorValidator},
};
use image::RgbImage;
use ndarray::{concatenate, s, Array1, Array3, Array4, ArrayD, Axis, Ix4};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, instrument};

/// Latent autoencoder stride; inputs are padded to it
pub const LDM_PAD_MODULO: usize = 32;

/// The three graphs making up an LDM inpainting model
pub struct LdmBackends {
    pub encoder: Box<dyn InferenceBackend>,
    pub decoder: Box<dyn InferenceBackend>,
    pub diffusion: Box<dyn InferenceBackend>,
}

/// Latent diffusion inpainting model
pub struct Ldm {
    backends: LdmBackends,
    sampler: DdimSampler,
    rng: StdRng,
}

impl std::fmt::Debug for Ldm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ldm")
            .field("steps", &self.sampler.schedule().len())
            .finish_non_exhaustive()
    }
}

fn to_array4(output: ArrayD<f32>) -> Result<Array4<f32>> {
    TensorValidator::validate_batched_output(output.shape())?;
    output
        .into_dimensionality::<Ix4>()
        .map_err(|e| InpaintError::inference(e.to_string()))
}

/// Nearest-neighbour resize of a `[1,C,H,W]` tensor (floor source index)
fn interpolate_nearest(tensor: &Array4<f32>, height: usize, width: usize) -> Array4<f32> {
    let (batch, channels, src_h, src_w) = tensor.dim();
    Array4::from_shape_fn((batch, channels, height, width), |(b, c, y, x)| {
        tensor[[b, c, y * src_h / height, x * src_w / width]]
    })
}

impl Ldm {
    /// # Errors
    /// - Invalid step count
    pub fn new(backends: LdmBackends, config: &InpaintConfig) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            backends,
            sampler: DdimSampler::new(config.ldm_steps)?,
            rng,
        })
    }

    fn encode(&mut self, masked_image: Array4<f32>) -> Result<Array4<f32>> {
        to_array4(
            self.backends
                .encoder
                .infer(&[BackendInput::Float(masked_image.into_dyn())])?,
        )
    }

    fn decode(&mut self, latent: Array4<f32>) -> Result<Array4<f32>> {
        to_array4(
            self.backends
                .decoder
                .infer(&[BackendInput::Float(latent.into_dyn())])?,
        )
    }
}

impl InpaintModel for Ldm {
    #[instrument(skip_all, fields(shape = ?image.dim(), steps = self.sampler.schedule().len()))]
    fn inpaint(&mut self, image: &Array3<f32>, mask: &Array3<f32>) -> Result<RgbImage> {
        TensorValidator::validate_inpaint_inputs(image, mask)?;
        let (_, height, width) = image.dim();

        let padded_image = ImagePreprocessor::pad_to_modulo(image, LDM_PAD_MODULO);
        let padded_mask = ImagePreprocessor::pad_to_modulo(mask, LDM_PAD_MODULO)
            .mapv(|v| if v >= 0.5 { 1.0 } else { 0.0 });

        let masked_image = &padded_image * &(1.0 - &padded_mask);
        let norm = |t: &Array3<f32>| t.mapv(|v| v * 2.0 - 1.0);
        let mask_norm = to_batched(norm(&padded_mask));
        let masked_norm = to_batched(norm(&masked_image));

        let latent = self.encode(
            masked_norm
                .into_dimensionality::<Ix4>()
                .map_err(|e| InpaintError::inference(e.to_string()))?,
        )?;
        let (_, _, latent_h, latent_w) = latent.dim();
        let mask_latent = interpolate_nearest(
            &mask_norm
                .into_dimensionality::<Ix4>()
                .map_err(|e| InpaintError::inference(e.to_string()))?,
            latent_h,
            latent_w,
        );
        let conditioning = concatenate(Axis(1), &[latent.view(), mask_latent.view()])
            .map_err(|e| InpaintError::inference(format!("Failed to build conditioning: {e}")))?;
        let latent_channels = conditioning.dim().1 - 1;
        debug!(?latent_h, ?latent_w, latent_channels, "encoded masked image");

        let noise = DdimSampler::noise(&mut self.rng, (1, latent_channels, latent_h, latent_w));
        let diffusion = &mut self.backends.diffusion;
        let samples = self.sampler.sample(noise, |x, timestep| {
            let x_in = concatenate(Axis(1), &[x.view(), conditioning.view()])
                .map_err(|e| InpaintError::inference(format!("Failed to build input: {e}")))?;
            let t = Array1::from_elem(1, timestep).into_dyn();
            to_array4(diffusion.infer(&[
                BackendInput::Float(x_in.into_dyn()),
                BackendInput::Int(t),
            ])?)
        })?;

        let decoded = self.decode(samples)?;
        let predicted = decoded
            .index_axis(Axis(0), 0)
            .mapv(|v| ((v + 1.0) / 2.0).clamp(0.0, 1.0));
        if predicted.dim() != padded_image.dim() {
            return Err(InpaintError::inference(format!(
                "Decoder output {:?} does not match padded input {:?}",
                predicted.dim(),
                padded_image.dim()
            )));
        }

        let composited = ImagePreprocessor::composite(&padded_image, &predicted, &padded_mask)?;
        ImagePreprocessor::tensor_to_rgb(&composited.slice(s![.., ..height, ..width]).to_owned())
    }

    fn release_cache(&mut self) {
        self.backends.encoder.release_cache();
        self.backends.diffusion.release_cache();
        self.backends.decoder.release_cache();
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Ldm
    }
}
