use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{GrayImage, Luma, Rgb, RgbImage};
use lama_cleaner::{
    types::Interpolation,
    utils::{boxes_from_mask, ImagePreprocessor},
};
use ndarray::Array3;

fn test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// Two painted strokes in opposite corners
fn test_mask(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let first = x < width / 4 && y < height / 4;
        let second = x > width * 3 / 4 && y > height * 3 / 4;
        Luma([if first || second { 255 } else { 0 }])
    })
}

fn bench_resize_to_limit(c: &mut Criterion) {
    let mut group = c.benchmark_group("resize_to_limit");
    let image = test_image(2048, 1536);

    for limit in [720_u32, 1080, 1280] {
        group.bench_with_input(BenchmarkId::from_parameter(limit), &limit, |b, &limit| {
            b.iter(|| {
                ImagePreprocessor::resize_to_limit(
                    black_box(&image),
                    limit,
                    Interpolation::Cubic,
                )
            });
        });
    }
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let image = test_image(1080, 810);
    let mask = test_mask(1080, 810);

    c.bench_function("normalize_image_1080", |b| {
        b.iter(|| ImagePreprocessor::normalize_image(black_box(&image)));
    });
    c.bench_function("normalize_mask_1080", |b| {
        b.iter(|| ImagePreprocessor::normalize_mask(black_box(&mask)));
    });
}

fn bench_padding(c: &mut Criterion) {
    let tensor = Array3::<f32>::from_elem((3, 1077, 803), 0.5);

    c.bench_function("pad_to_modulo_8", |b| {
        b.iter(|| ImagePreprocessor::pad_to_modulo(black_box(&tensor), 8));
    });
    c.bench_function("letterbox_512", |b| {
        b.iter(|| ImagePreprocessor::letterbox(black_box(&tensor), 512, Interpolation::Cubic));
    });
}

fn bench_boxes_from_mask(c: &mut Criterion) {
    let mask = ImagePreprocessor::normalize_mask(&test_mask(2048, 2048));

    c.bench_function("boxes_from_mask_2048", |b| {
        b.iter(|| boxes_from_mask(black_box(&mask)));
    });
}

criterion_group!(
    benches,
    bench_resize_to_limit,
    bench_normalize,
    bench_padding,
    bench_boxes_from_mask
);
criterion_main!(benches);
