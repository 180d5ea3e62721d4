//! Validation helpers shared by the pipeline and the command line

pub mod input;
pub mod model;
pub mod tensor;

pub use input::PathValidator;
pub use model::{ModelValidator, LDM_GRAPH_FILES};
pub use tensor::TensorValidator;
