//! Service layer for image byte I/O

pub mod io;

pub use io::{ImageCodec, DEFAULT_JPEG_QUALITY};
