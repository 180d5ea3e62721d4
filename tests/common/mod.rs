//! Shared fixtures for integration tests

#![allow(dead_code)]

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use lama_cleaner::{
    config::{InpaintConfig, ModelKind, ServerConfig},
    error::{InpaintError, Result},
    models::InpaintModel,
    processor::InpaintProcessor,
    server::{router, AppState},
    utils::ImagePreprocessor,
};
use ndarray::Array3;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

pub const BOUNDARY: &str = "lama-cleaner-test-boundary";

/// Model painting the masked region a fixed color and recording its calls
pub struct FillModel {
    pub fill: [f32; 3],
    pub fail: bool,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FillModel {
    pub fn new(calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            fill: [1.0, 1.0, 1.0],
            fail: false,
            calls,
        }
    }

    pub fn failing(calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            fail: true,
            ..Self::new(calls)
        }
    }
}

impl InpaintModel for FillModel {
    fn inpaint(&mut self, image: &Array3<f32>, mask: &Array3<f32>) -> Result<RgbImage> {
        let (_, height, width) = image.dim();
        self.calls
            .lock()
            .unwrap()
            .push(format!("inpaint {width}x{height}"));
        if self.fail {
            return Err(InpaintError::inference("device lost"));
        }
        let fill = Array3::from_shape_fn(image.dim(), |(c, _, _)| self.fill[c]);
        let binary = ImagePreprocessor::binarize_mask(mask, 0.0);
        let result = ImagePreprocessor::composite(image, &fill, &binary)?;
        ImagePreprocessor::tensor_to_rgb(&result)
    }

    fn release_cache(&mut self) {
        self.calls.lock().unwrap().push("release_cache".to_string());
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Lama
    }
}

pub fn processor_with(model: FillModel) -> InpaintProcessor {
    InpaintProcessor::with_model(Box::new(model), InpaintConfig::default())
}

pub fn app_with(model: FillModel, server_config: ServerConfig) -> axum::Router {
    router(AppState::new(processor_with(model), server_config))
}

/// Horizontal gradient image
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    })
}

/// Mask with a white rectangle `[x0,x1) x [y0,y1)`
pub fn rect_mask(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

pub fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

pub fn png(image: DynamicImage) -> Vec<u8> {
    encode(image, ImageFormat::Png)
}

/// Hand-built `multipart/form-data` body
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }
}
