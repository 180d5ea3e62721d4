//! Utility modules for preprocessing, mask analysis and validation

pub mod mask;
pub mod preprocessing;
pub mod validation;

pub use mask::{boxes_from_mask, MaskBox};
pub use preprocessing::ImagePreprocessor;
pub use validation::{ModelValidator, PathValidator, TensorValidator};
