use criterion::{black_box, criterion_group, criterion_main, Criterion};
use imago::*;

fn test_image(width: u32, height: u32) -> Image {
    Image::Rgb(
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb::new((x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8)
        })
        .unwrap(),
    )
}

fn bench_png_encode(c: &mut Criterion) {
    let image = test_image(256, 256);

    c.bench_function("png_encode_256", |b| {
        b.iter(|| black_box(image.encode_to_vec(ImageFormat::Png).unwrap()))
    });
}

fn bench_png_decode(c: &mut Criterion) {
    let encoded = test_image(256, 256).encode_to_vec(ImageFormat::Png).unwrap();

    c.bench_function("png_decode_256", |b| {
        b.iter(|| black_box(Image::from_bytes_inferred(black_box(&encoded)).unwrap()))
    });
}

fn bench_jpeg_decode(c: &mut Criterion) {
    let encoded = test_image(256, 256)
        .encode_to_vec(ImageFormat::Jpeg)
        .unwrap();

    c.bench_function("jpeg_decode_256", |b| {
        b.iter(|| black_box(Image::from_bytes_inferred(black_box(&encoded)).unwrap()))
    });
}

fn bench_gif_decode(c: &mut Criterion) {
    let encoded = test_image(256, 256).encode_to_vec(ImageFormat::Gif).unwrap();

    c.bench_function("gif_decode_256", |b| {
        b.iter(|| black_box(Image::from_bytes_inferred(black_box(&encoded)).unwrap()))
    });
}

fn bench_format_detection(c: &mut Criterion) {
    let encoded = test_image(64, 64).encode_to_vec(ImageFormat::Png).unwrap();

    c.bench_function("format_detect", |b| {
        b.iter(|| black_box(ImageFormat::detect(black_box(&encoded)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_png_encode,
    bench_png_decode,
    bench_jpeg_decode,
    bench_gif_decode,
    bench_format_detection
);
criterion_main!(benches);
