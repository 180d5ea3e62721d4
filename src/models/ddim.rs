//! Deterministic DDIM sampling for latent diffusion inpainting
//!
//! Noise schedule and the eta = 0 update rule. The denoiser itself is passed
//! in as a closure so the sampler has no dependency on an inference backend.

use crate::error::{InpaintError, Result};
use ndarray::{Array4, Zip};
use rand::Rng;

/// Number of diffusion timesteps the model was trained with
pub const TRAIN_TIMESTEPS: usize = 1000;

const LINEAR_START: f64 = 0.0015;
const LINEAR_END: f64 = 0.0205;

/// `alpha_bar_t` for every training timestep
///
/// Betas are spaced linearly in square-root space between 0.0015 and 0.0205.
#[must_use]
pub fn alphas_cumprod() -> Vec<f64> {
    let (start, end) = (LINEAR_START.sqrt(), LINEAR_END.sqrt());
    let last = (TRAIN_TIMESTEPS - 1) as f64;

    let mut product = 1.0;
    (0..TRAIN_TIMESTEPS)
        .map(|i| {
            let beta = (start + (end - start) * i as f64 / last).powi(2);
            product *= 1.0 - beta;
            product
        })
        .collect()
}

/// Sub-sampled timesteps and their cumulative alphas
#[derive(Debug, Clone, PartialEq)]
pub struct DdimSchedule {
    /// Ascending timesteps fed to the denoiser
    pub timesteps: Vec<i64>,
    /// `alpha_bar` at each timestep
    pub alphas: Vec<f64>,
    /// `alpha_bar` at the previous timestep (`alpha_bar_0` for the first)
    pub alphas_prev: Vec<f64>,
}

impl DdimSchedule {
    /// Uniformly spaced schedule of `steps` timesteps
    ///
    /// # Errors
    /// - `steps` outside `1..=1000`
    pub fn new(steps: usize) -> Result<Self> {
        if steps == 0 || steps > TRAIN_TIMESTEPS {
            return Err(InpaintError::config_value_error(
                "DDIM steps",
                steps,
                "1-1000",
                Some(50),
            ));
        }

        let stride = TRAIN_TIMESTEPS / steps;
        let timesteps: Vec<usize> = (0..steps)
            .map(|i| (i * stride + 1).min(TRAIN_TIMESTEPS - 1))
            .collect();

        let acp = alphas_cumprod();
        let alphas: Vec<f64> = timesteps.iter().map(|&t| acp[t]).collect();
        let alphas_prev: Vec<f64> = std::iter::once(acp[0])
            .chain(alphas.iter().take(steps - 1).copied())
            .collect();

        Ok(Self {
            timesteps: timesteps.iter().map(|&t| t as i64).collect(),
            alphas,
            alphas_prev,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.timesteps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timesteps.is_empty()
    }
}

/// DDIM sampler with eta = 0
#[derive(Debug, Clone)]
pub struct DdimSampler {
    schedule: DdimSchedule,
}

impl DdimSampler {
    /// # Errors
    /// - `steps` outside `1..=1000`
    pub fn new(steps: usize) -> Result<Self> {
        Ok(Self {
            schedule: DdimSchedule::new(steps)?,
        })
    }

    #[must_use]
    pub fn schedule(&self) -> &DdimSchedule {
        &self.schedule
    }

    /// Standard normal noise of the given shape
    pub fn noise<R: Rng>(rng: &mut R, shape: (usize, usize, usize, usize)) -> Array4<f32> {
        Array4::from_shape_simple_fn(shape, || {
            // Box-Muller
            let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
            let u2: f64 = rng.gen();
            ((-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()) as f32
        })
    }

    /// Run the reverse process from `x_t`
    ///
    /// `predict_noise(x, t)` returns the noise estimate for latent `x` at timestep `t`.
    ///
    /// # Errors
    /// - Any error returned by `predict_noise`
    /// - Noise estimate with a shape different from the latent
    pub fn sample<F>(&self, mut x: Array4<f32>, mut predict_noise: F) -> Result<Array4<f32>>
    where
        F: FnMut(&Array4<f32>, i64) -> Result<Array4<f32>>,
    {
        let total = self.schedule.len();
        for (i, &timestep) in self.schedule.timesteps.iter().rev().enumerate() {
            let index = total - i - 1;
            let e_t = predict_noise(&x, timestep)?;
            if e_t.dim() != x.dim() {
                return Err(InpaintError::inference(format!(
                    "Noise estimate shape {:?} does not match latent shape {:?}",
                    e_t.dim(),
                    x.dim()
                )));
            }

            let a_t = self.schedule.alphas[index];
            let a_prev = self.schedule.alphas_prev[index];
            let sqrt_a_t = a_t.sqrt() as f32;
            let sqrt_one_minus_a_t = (1.0 - a_t).sqrt() as f32;
            let sqrt_a_prev = a_prev.sqrt() as f32;
            let dir_coeff = (1.0 - a_prev).sqrt() as f32;

            Zip::from(&mut x).and(&e_t).for_each(|x, &e| {
                let pred_x0 = (*x - sqrt_one_minus_a_t * e) / sqrt_a_t;
                *x = sqrt_a_prev * pred_x0 + dir_coeff * e;
            });

            log::trace!("DDIM step {}/{} (t={timestep})", i + 1, total);
        }
        Ok(x)
    }
}
