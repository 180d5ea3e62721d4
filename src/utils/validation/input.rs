//! Startup validation of user-supplied paths

use crate::error::{InpaintError, Result};
use std::path::Path;

/// Validator for files named on the command line
pub struct PathValidator;

impl PathValidator {
    /// `--input` must exist and sniff as a supported raster format
    pub fn validate_input_image(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(InpaintError::validation(format!(
                "invalid --input: {} not exists",
                path.display()
            )));
        }

        if !crate::services::ImageCodec::is_decodable_file(path) {
            return Err(InpaintError::validation(format!(
                "invalid --input: {} is not a valid image file",
                path.display()
            )));
        }

        Ok(())
    }
}
