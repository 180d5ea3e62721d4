//! Core request and result types

use crate::error::{InpaintError, Result};
use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Form value that selects the original resolution
pub const ORIGINAL_SIZE_SENTINEL: &str = "Original";

/// Size limit used when the form omits `sizeLimit`
pub const DEFAULT_SIZE_LIMIT: u32 = 1080;

/// Maximum longer side an upload is resized to before inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeLimit {
    Pixels(u32),
    /// Keep the image's own longest side
    Original,
}

impl SizeLimit {
    /// Resolve against an image of the given dimensions
    #[must_use]
    pub fn resolve(self, width: u32, height: u32) -> u32 {
        match self {
            Self::Pixels(limit) => limit,
            Self::Original => width.max(height),
        }
    }
}

impl Default for SizeLimit {
    fn default() -> Self {
        Self::Pixels(DEFAULT_SIZE_LIMIT)
    }
}

impl std::fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pixels(limit) => write!(f, "{limit}"),
            Self::Original => write!(f, "{ORIGINAL_SIZE_SENTINEL}"),
        }
    }
}

impl std::str::FromStr for SizeLimit {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim();
        if value == ORIGINAL_SIZE_SENTINEL {
            return Ok(Self::Original);
        }

        match value.parse::<u32>() {
            Ok(0) => Err(InpaintError::validation("sizeLimit must be positive")),
            Ok(limit) => Ok(Self::Pixels(limit)),
            Err(_) => Err(InpaintError::validation(format!(
                "sizeLimit must be a positive integer or \"{ORIGINAL_SIZE_SENTINEL}\", got \"{value}\""
            ))),
        }
    }
}

/// Resampling kernel for resize-to-limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Interpolation {
    Nearest,
    Linear,
    #[default]
    Cubic,
    Lanczos,
}

impl Interpolation {
    #[must_use]
    pub fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Linear => FilterType::Triangle,
            Self::Cubic => FilterType::CatmullRom,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

impl std::str::FromStr for Interpolation {
    type Err = InpaintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" | "bilinear" => Ok(Self::Linear),
            "cubic" | "bicubic" => Ok(Self::Cubic),
            "lanczos" => Ok(Self::Lanczos),
            other => Err(InpaintError::invalid_config(format!(
                "Unknown interpolation: {other}. Supported: nearest, linear, cubic, lanczos"
            ))),
        }
    }
}

/// Timing breakdown of one request, in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub preprocess_ms: u64,
    pub inference_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

/// Output of one inpainting request
#[derive(Debug, Clone)]
pub struct InpaintResult {
    /// Inpainted image at the resized resolution
    pub image: RgbImage,
    /// Upload dimensions `(width, height)`
    pub original_dimensions: (u32, u32),
    /// Dimensions fed to the model `(width, height)`
    pub processed_dimensions: (u32, u32),
    pub timings: ProcessingTimings,
}

impl InpaintResult {
    /// Encode the inpainted image as JPEG
    ///
    /// # Errors
    /// - JPEG encoder failures
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        crate::services::ImageCodec::encode_jpeg(&self.image, quality)
    }
}
