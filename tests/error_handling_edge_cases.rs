//! Error paths across configuration, model loading, decoding and the weights cache

mod common;

use common::{gradient, png, rect_mask, FillModel};
use image::DynamicImage;
use lama_cleaner::{
    create_model,
    utils::{ModelValidator, TensorValidator},
    DefaultBackendFactory, InpaintConfig, InpaintError, ModelKind, ModelSource, SizeLimit,
    WeightsCache,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[test]
fn test_config_rejects_out_of_range_values() {
    let cases = [
        InpaintConfig {
            jpeg_quality: 0,
            ..InpaintConfig::default()
        },
        InpaintConfig {
            ldm_steps: 0,
            ..InpaintConfig::default()
        },
        InpaintConfig {
            ldm_steps: 1001,
            ..InpaintConfig::default()
        },
        InpaintConfig {
            crop_trigger_size: [0, 2042],
            ..InpaintConfig::default()
        },
        InpaintConfig {
            lama_input_size: Some(100),
            ..InpaintConfig::default()
        },
        InpaintConfig {
            model: ModelKind::Ldm,
            ldm_model_dir: None,
            ..InpaintConfig::default()
        },
    ];

    for config in cases {
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, InpaintError::InvalidConfig(_)),
            "unexpected error for {config:?}: {err}"
        );
    }
}

#[test]
fn test_unknown_names_are_rejected() {
    assert!("sd1.5".parse::<ModelKind>().is_err());
    assert!("tpu".parse::<lama_cleaner::ExecutionProvider>().is_err());
    assert_eq!(
        "cuda:1".parse::<lama_cleaner::ExecutionProvider>().unwrap(),
        lama_cleaner::ExecutionProvider::Cuda
    );
}

#[test]
fn test_create_model_requires_downloaded_weights() {
    let config = InpaintConfig::default();
    assert!(matches!(config.lama_model, ModelSource::Url(_)));

    let err = create_model(&config, &DefaultBackendFactory).unwrap_err();
    assert!(matches!(err, InpaintError::Model(_)));
}

#[test]
fn test_create_model_missing_file() {
    let config = InpaintConfig {
        lama_model: ModelSource::External("/definitely/not/here/big-lama.onnx".into()),
        ..InpaintConfig::default()
    };
    let err = create_model(&config, &DefaultBackendFactory).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn test_create_model_incomplete_ldm_dir() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("diffusion.onnx"), b"graph").unwrap();
    let config = InpaintConfig {
        model: ModelKind::Ldm,
        ldm_model_dir: Some(dir.path().to_path_buf()),
        ..InpaintConfig::default()
    };

    let err = create_model(&config, &DefaultBackendFactory).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("cond_stage_model_encode.onnx"));
    assert!(message.contains("cond_stage_model_decode.onnx"));
    assert!(!message.contains("diffusion.onnx,"));
}

#[test]
fn test_model_url_validation() {
    assert!(ModelValidator::validate_model_url("https://host/models/big-lama.onnx").is_ok());
    assert!(ModelValidator::validate_model_url("ftp://host/big-lama.onnx").is_err());
    assert!(ModelValidator::validate_model_url("https://host/models/").is_err());
}

#[test]
fn test_size_limit_parsing_edge_cases() {
    assert_eq!(" 720 ".parse::<SizeLimit>().unwrap(), SizeLimit::Pixels(720));
    assert_eq!("Original".parse::<SizeLimit>().unwrap(), SizeLimit::Original);
    for bad in ["0", "-5", "original", "", "1e3"] {
        let err = bad.parse::<SizeLimit>().unwrap_err();
        assert!(err.is_client_error(), "{bad:?} gave {err}");
    }
}

#[test]
fn test_dimension_bounds() {
    assert!(TensorValidator::validate_image_dimensions(1, 1).is_ok());
    assert!(TensorValidator::validate_image_dimensions(16384, 16384).is_ok());
    assert!(TensorValidator::validate_image_dimensions(0, 10).is_err());
    assert!(TensorValidator::validate_image_dimensions(16385, 10).is_err());
}

#[test]
fn test_mismatched_upload_is_validation_error_without_inference() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut processor = common::processor_with(FillModel::new(Arc::clone(&calls)));

    let image = png(DynamicImage::ImageRgb8(gradient(32, 32)));
    let mask = png(DynamicImage::ImageLuma8(rect_mask(16, 32, 0, 0, 4, 4)));
    let err = processor.process_request(&image, &mask, "1080").unwrap_err();

    assert!(matches!(err, InpaintError::Validation(_)));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_empty_upload_is_decode_error() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut processor = common::processor_with(FillModel::new(Arc::clone(&calls)));
    let mask = png(DynamicImage::ImageLuma8(rect_mask(8, 8, 0, 0, 2, 2)));

    let err = processor.process_request(&[], &mask, "1080").unwrap_err();
    assert!(matches!(err, InpaintError::Decode(_)));

    let image = png(DynamicImage::ImageRgb8(gradient(8, 8)));
    let err = processor
        .process_request(&image, b"\x89PNG truncated", "1080")
        .unwrap_err();
    assert!(matches!(err, InpaintError::Decode(_)));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_failed_inference_still_releases_cache() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut processor = common::processor_with(FillModel::failing(Arc::clone(&calls)));

    let image = png(DynamicImage::ImageRgb8(gradient(8, 8)));
    let mask = png(DynamicImage::ImageLuma8(rect_mask(8, 8, 0, 0, 2, 2)));
    let err = processor.process_to_jpeg(&image, &mask, "Original").unwrap_err();

    assert!(matches!(err, InpaintError::Inference(_)));
    assert!(!err.is_client_error());
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["inpaint 8x8".to_string(), "release_cache".to_string()]
    );
}

#[test]
fn test_cache_ignores_partial_and_empty_files() {
    let dir = TempDir::new().unwrap();
    let cache = WeightsCache::with_custom_cache_dir(dir.path()).unwrap();
    let url = "https://host/models/big-lama.onnx";

    assert!(!cache.is_cached(url));
    std::fs::write(cache.checkpoint_path(url), b"").unwrap();
    assert!(!cache.is_cached(url));

    std::fs::write(cache.checkpoint_dir().join("big-lama.onnx.part"), b"partial").unwrap();
    std::fs::write(cache.checkpoint_path(url), b"weights").unwrap();
    assert!(cache.is_cached(url));

    let names: Vec<String> = cache
        .scan_checkpoints()
        .unwrap()
        .into_iter()
        .map(|info| info.file_name)
        .collect();
    assert_eq!(names, vec!["big-lama.onnx".to_string()]);
}
