//! Round-trip laws per format.
//!
//! PNG and BMP are lossless for every encoding this crate defines, GIF is
//! lossless for frames with at most 256 distinct opaque colors, and JPEG
//! is checked against a tolerance instead of exact equality.

use imago::*;

fn gradient_rgb(width: u32, height: u32) -> ImageBuffer<Rgb> {
    ImageBuffer::from_fn(width, height, |x, y| {
        Rgb::new((x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) * 5 % 256) as u8)
    })
    .unwrap()
}

fn max_channel_delta(a: &ImageBuffer<Rgba>, b: &ImageBuffer<Rgba>) -> u8 {
    a.pixels()
        .zip(b.pixels())
        .map(|(p, q)| {
            p.r.abs_diff(q.r)
                .max(p.g.abs_diff(q.g))
                .max(p.b.abs_diff(q.b))
                .max(p.a.abs_diff(q.a))
        })
        .max()
        .unwrap()
}

#[test]
fn test_png_roundtrip_rgb() {
    let original: Image = gradient_rgb(31, 17).into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Png).unwrap())
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_png_roundtrip_rgba() {
    let buf = ImageBuffer::from_fn(16, 16, |x, y| {
        Rgba::new((x * 16) as u8, (y * 16) as u8, 77, ((x + y) * 8) as u8)
    })
    .unwrap();
    let original: Image = buf.into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Png).unwrap())
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_png_roundtrip_luma() {
    let buf = ImageBuffer::from_fn(9, 13, |x, y| L((x * 23 + y * 3) as u8)).unwrap();
    let original: Image = buf.into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Png).unwrap())
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_png_roundtrip_luma_alpha() {
    let buf = ImageBuffer::from_fn(8, 8, |x, y| La::new((x * 32) as u8, (y * 32) as u8)).unwrap();
    let original: Image = buf.into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Png).unwrap())
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_png_palette_decode() {
    // Hand-built 2x2 paletted PNG with transparency: indices
    // [0, 1, 2, 1], palette red/green/blue, alpha 255/128/0
    let mut png = format::PNG_SIGNATURE.to_vec();
    let chunk = |out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]| {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(kind);
        hasher.update(data);
        out.extend_from_slice(&hasher.finalize().to_be_bytes());
    };
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&2u32.to_be_bytes());
    ihdr.extend_from_slice(&2u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 3, 0, 0, 0]);
    chunk(&mut png, b"IHDR", &ihdr);
    chunk(&mut png, b"PLTE", &[255, 0, 0, 0, 255, 0, 0, 0, 255]);
    chunk(&mut png, b"tRNS", &[255, 128, 0]);
    // Scanlines: filter 0 + indices per row
    let raw = [0u8, 0, 1, 0, 2, 1];
    let mut idat = Vec::new();
    {
        use std::io::Write;
        let mut z = flate2::write::ZlibEncoder::new(&mut idat, flate2::Compression::default());
        z.write_all(&raw).unwrap();
        z.finish().unwrap();
    }
    chunk(&mut png, b"IDAT", &idat);
    chunk(&mut png, b"IEND", &[]);

    let image = Image::from_bytes_inferred(&png).unwrap();
    assert_eq!(image.color_type(), ColorType::Rgba);
    assert_eq!(image.get_pixel(0, 0).unwrap(), Dynamic::from_rgba(255, 0, 0, 255));
    assert_eq!(image.get_pixel(1, 0).unwrap(), Dynamic::from_rgba(0, 255, 0, 128));
    assert_eq!(image.get_pixel(0, 1).unwrap(), Dynamic::from_rgba(0, 0, 255, 0));
    assert_eq!(image.get_pixel(1, 1).unwrap(), Dynamic::from_rgba(0, 255, 0, 128));
}

#[test]
fn test_bmp_roundtrip_rgb() {
    let original: Image = gradient_rgb(13, 7).into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Bmp).unwrap())
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_bmp_roundtrip_rgba() {
    let buf = ImageBuffer::from_fn(5, 9, |x, y| {
        Rgba::new((x * 50) as u8, (y * 25) as u8, 200, (x * y * 7 % 256) as u8)
    })
    .unwrap();
    let original: Image = buf.into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Bmp).unwrap())
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_bmp_roundtrip_luma() {
    let buf = ImageBuffer::from_fn(6, 4, |x, y| L((x * 40 + y) as u8)).unwrap();
    let original: Image = buf.into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Bmp).unwrap())
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_bmp_luma_alpha_widens_to_rgba() {
    // BMP has no two-channel encoding; LA encodes as 32-bit BGRA
    let buf = ImageBuffer::from_fn(3, 3, |x, y| La::new((x * 80) as u8, (y * 90) as u8)).unwrap();
    let original: Image = buf.clone().into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Bmp).unwrap())
        .unwrap();
    assert_eq!(decoded.color_type(), ColorType::Rgba);
    assert_eq!(decoded.to_rgba_buffer(), buf.convert::<Rgba>());
}

#[test]
fn test_gif_roundtrip_few_colors_exact() {
    // 4 distinct opaque colors stay byte-exact through the palette
    let buf = ImageBuffer::from_fn(16, 16, |x, y| {
        let palette = [
            Rgba::new(255, 0, 0, 255),
            Rgba::new(0, 255, 0, 255),
            Rgba::new(0, 0, 255, 255),
            Rgba::new(255, 255, 255, 255),
        ];
        palette[((x / 4 + y / 4) % 4) as usize]
    })
    .unwrap();
    let original: Image = buf.into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Gif).unwrap())
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_gif_roundtrip_transparency() {
    let buf = ImageBuffer::from_fn(8, 8, |x, _| {
        if x < 4 {
            Rgba::new(10, 220, 10, 255)
        } else {
            Rgba::transparent()
        }
    })
    .unwrap();
    let original: Image = buf.into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Gif).unwrap())
        .unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_gif_many_colors_quantized_within_cube_error() {
    // More than 256 distinct colors falls back to the fixed color cube;
    // every channel stays within one cube cell of the source.
    let original = gradient_rgb(64, 64).convert::<Rgba>();
    let image: Image = original.clone().into();
    let decoded = Image::from_bytes_inferred(&image.encode_to_vec(ImageFormat::Gif).unwrap())
        .unwrap();
    assert_eq!(decoded.dimensions(), (64, 64));
    assert!(max_channel_delta(&decoded.to_rgba_buffer(), &original) <= 26);
}

#[test]
fn test_gif_animation_roundtrip_exact() {
    let frame = |color: Rgba| {
        Frame::from_image(Image::Rgba(ImageBuffer::new(10, 10, color).unwrap()))
            .with_delay(std::time::Duration::from_millis(100))
    };
    let sequence = ImageSequence::from_frames(vec![
        frame(Rgba::new(255, 0, 0, 255)),
        frame(Rgba::new(0, 255, 0, 255)),
    ]);
    let decoded =
        ImageSequence::from_bytes_inferred(&sequence.encode_to_vec(ImageFormat::Gif).unwrap())
            .unwrap();
    assert_eq!(decoded.len(), 2);
    for (original, roundtripped) in sequence.iter().zip(decoded.iter()) {
        assert_eq!(original.image(), roundtripped.image());
        assert_eq!(original.delay(), roundtripped.delay());
    }
}

#[test]
fn test_jpeg_roundtrip_solid_color_within_tolerance() {
    let original = ImageBuffer::new(24, 24, Rgba::new(120, 80, 200, 255)).unwrap();
    let image: Image = Image::Rgb(original.convert::<Rgb>());
    let decoded = Image::from_bytes_inferred(&image.encode_to_vec(ImageFormat::Jpeg).unwrap())
        .unwrap();
    assert_eq!(decoded.dimensions(), (24, 24));
    assert_eq!(decoded.color_type(), ColorType::Rgb);
    assert!(max_channel_delta(&decoded.to_rgba_buffer(), &original) <= 4);
}

#[test]
fn test_jpeg_roundtrip_smooth_gradient_within_tolerance() {
    let buf = ImageBuffer::from_fn(32, 32, |x, y| L((x * 4 + y * 2) as u8)).unwrap();
    let image: Image = buf.clone().into();
    let decoded = Image::from_bytes_inferred(&image.encode_to_vec(ImageFormat::Jpeg).unwrap())
        .unwrap();
    assert_eq!(decoded.color_type(), ColorType::L);
    assert!(max_channel_delta(&decoded.to_rgba_buffer(), &buf.convert::<Rgba>()) <= 12);
}

#[test]
fn test_jpeg_odd_dimensions() {
    // Edge blocks replicate; dimensions must survive exactly
    let image: Image = gradient_rgb(17, 11).into();
    let decoded = Image::from_bytes_inferred(&image.encode_to_vec(ImageFormat::Jpeg).unwrap())
        .unwrap();
    assert_eq!(decoded.dimensions(), (17, 11));
}

#[test]
fn test_png_non_trivial_size_roundtrip() {
    let original: Image = gradient_rgb(200, 150).into();
    let decoded = Image::from_bytes_inferred(&original.encode_to_vec(ImageFormat::Png).unwrap())
        .unwrap();
    assert_eq!(decoded, original);
}
