//! Image codec service
//!
//! Decodes uploaded bytes into typed rasters and encodes results as JPEG.
//! Keeps byte-level I/O out of the pipeline so it can be tested in isolation.

use crate::error::{InpaintError, Result};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, GrayImage, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Default JPEG quality for responses
pub const DEFAULT_JPEG_QUALITY: u8 = 100;

/// Service for converting between raw bytes and rasters
pub struct ImageCodec;

impl ImageCodec {
    /// Decode an uploaded image
    ///
    /// The result is `Luma8` when `grayscale` is set, otherwise `Rgb8` with any
    /// alpha channel dropped.
    ///
    /// # Errors
    /// - Empty input
    /// - Unrecognized or malformed raster data
    pub fn decode(bytes: &[u8], grayscale: bool) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(InpaintError::decode("empty image data"));
        }

        let image = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| InpaintError::decode(format!("failed to read image data: {e}")))?
            .decode()
            .map_err(|e| InpaintError::decode(format!("failed to decode image: {e}")))?;

        if image.width() == 0 || image.height() == 0 {
            return Err(InpaintError::decode("image has zero width or height"));
        }

        Ok(if grayscale {
            DynamicImage::ImageLuma8(image.into_luma8())
        } else {
            DynamicImage::ImageRgb8(image.into_rgb8())
        })
    }

    /// Decode an uploaded image as three-channel RGB
    ///
    /// # Errors
    /// See [`ImageCodec::decode`]
    pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
        Ok(Self::decode(bytes, false)?.into_rgb8())
    }

    /// Decode an uploaded mask as single-channel grayscale
    ///
    /// # Errors
    /// See [`ImageCodec::decode`]
    pub fn decode_mask(bytes: &[u8]) -> Result<GrayImage> {
        Ok(Self::decode(bytes, true)?.into_luma8())
    }

    /// Encode an RGB raster as baseline JPEG
    ///
    /// # Errors
    /// - Encoder failures
    pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        let (width, height) = image.dimensions();
        JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100)).encode(
            image.as_raw(),
            width,
            height,
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(buffer)
    }

    /// Whether the file content sniffs as a supported raster format
    #[must_use]
    pub fn is_decodable_file(path: &Path) -> bool {
        image::ImageReader::open(path)
            .and_then(image::ImageReader::with_guessed_format)
            .map(|reader| reader.format().is_some())
            .unwrap_or(false)
    }
}
