//! Model file validation utilities

use crate::error::{InpaintError, Result};
use std::path::Path;

/// Graph files an LDM model directory must contain
pub const LDM_GRAPH_FILES: [&str; 3] = [
    "cond_stage_model_encode.onnx",
    "cond_stage_model_decode.onnx",
    "diffusion.onnx",
];

/// Validator for model files and directories
pub struct ModelValidator;

impl ModelValidator {
    /// Validate a model file path
    pub fn validate_model_file_path(path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(InpaintError::model(format!(
                "Model file does not exist: {}",
                path.display()
            )));
        }

        // Check for ONNX extension
        if path.extension().and_then(|s| s.to_str()) != Some("onnx") {
            return Err(InpaintError::model(format!(
                "Model file must have .onnx extension: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Validate that `dir` holds the encoder, decoder and denoiser graphs
    pub fn validate_ldm_model_dir(dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            return Err(InpaintError::model(format!(
                "LDM model directory does not exist: {}",
                dir.display()
            )));
        }

        let missing: Vec<&str> = LDM_GRAPH_FILES
            .iter()
            .copied()
            .filter(|name| !dir.join(name).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(InpaintError::model(format!(
                "LDM model directory {} is missing: {}",
                dir.display(),
                missing.join(", ")
            )));
        }

        Ok(())
    }

    /// Validate a weights URL
    pub fn validate_model_url(url: &str) -> Result<()> {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(InpaintError::invalid_config(format!(
                "Model URL must use http or https: {url}"
            )));
        }

        let file_name = url.rsplit('/').next().unwrap_or_default();
        if file_name.is_empty() || !file_name.contains('.') {
            return Err(InpaintError::invalid_config(format!(
                "Model URL must end with a file name: {url}"
            )));
        }

        Ok(())
    }
}
