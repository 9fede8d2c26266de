use std::time::Duration;

use imago::*;

#[test]
fn test_signature_constants() {
    assert_eq!(format::PNG_SIGNATURE.len(), 8);
    assert_eq!(format::GIF87A_SIGNATURE, b"GIF87a");
    assert_eq!(format::GIF89A_SIGNATURE, b"GIF89a");
    assert_eq!(format::JPEG_SIGNATURE, &[0xFF, 0xD8]);
    assert_eq!(format::BMP_SIGNATURE, b"BM");
}

#[test]
fn test_registry_order_is_deterministic() {
    let formats: Vec<ImageFormat> = CODECS.iter().map(|d| d.format).collect();
    assert_eq!(
        formats,
        vec![
            ImageFormat::Png,
            ImageFormat::Gif,
            ImageFormat::Jpeg,
            ImageFormat::Bmp
        ]
    );
    // No registered signature may be a prefix of another
    for (i, a) in CODECS.iter().enumerate() {
        for (j, b) in CODECS.iter().enumerate() {
            if i == j {
                continue;
            }
            for sig_a in a.signatures {
                for sig_b in b.signatures {
                    assert!(!sig_b.starts_with(sig_a), "{} shadows {}", a.format, b.format);
                }
            }
        }
    }
}

#[test]
fn test_detect_known_signatures() {
    assert_eq!(
        ImageFormat::detect(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]).unwrap(),
        ImageFormat::Png
    );
    assert_eq!(ImageFormat::detect(b"GIF87a\x01\x00").unwrap(), ImageFormat::Gif);
    assert_eq!(ImageFormat::detect(b"GIF89a\x01\x00").unwrap(), ImageFormat::Gif);
    assert_eq!(ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap(), ImageFormat::Jpeg);
    assert_eq!(ImageFormat::detect(b"BM\x00\x00").unwrap(), ImageFormat::Bmp);
}

#[test]
fn test_detect_truncated_never_unrecognized() {
    // Shorter than the shortest signature
    assert!(ImageFormat::detect(&[]).unwrap_err().is_truncation());
    assert!(ImageFormat::detect(&[0x89]).unwrap_err().is_truncation());
    // A proper prefix of a longer signature
    assert!(ImageFormat::detect(&[0x89, b'P', b'N', b'G'])
        .unwrap_err()
        .is_truncation());
    assert!(ImageFormat::detect(b"GIF8").unwrap_err().is_truncation());
}

#[test]
fn test_detect_unrecognized() {
    assert_eq!(
        ImageFormat::detect(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]).unwrap_err(),
        Error::UnrecognizedFormat
    );
}

#[test]
fn test_format_from_extension() {
    assert_eq!(ImageFormat::from_extension("png").unwrap(), ImageFormat::Png);
    assert_eq!(ImageFormat::from_extension(".PNG").unwrap(), ImageFormat::Png);
    assert_eq!(ImageFormat::from_extension("jpeg").unwrap(), ImageFormat::Jpeg);
    assert_eq!(ImageFormat::from_extension("jpg").unwrap(), ImageFormat::Jpeg);
    assert_eq!(ImageFormat::from_extension("gif").unwrap(), ImageFormat::Gif);
    assert_eq!(ImageFormat::from_extension("bmp").unwrap(), ImageFormat::Bmp);
    assert!(matches!(
        ImageFormat::from_extension("tiff"),
        Err(Error::UnknownExtension(_))
    ));
}

#[test]
fn test_one_by_one_white_rgba() {
    let image = Image::new(1, 1, Dynamic::from_rgba(255, 255, 255, 255)).unwrap();
    assert_eq!(image.width(), 1);
    assert_eq!(image.height(), 1);
    assert_eq!(image.dimensions(), (1, 1));
    assert_eq!(
        image.get_pixel(0, 0).unwrap(),
        Dynamic::from_rgba(255, 255, 255, 255)
    );
}

#[test]
fn test_zero_dimensions_rejected() {
    let fill = Rgb::new(0, 0, 0);
    assert!(matches!(
        ImageBuffer::new(0, 10, fill),
        Err(Error::InvalidDimensions { width: 0, height: 10 })
    ));
    assert!(matches!(
        ImageBuffer::new(10, 0, fill),
        Err(Error::InvalidDimensions { width: 10, height: 0 })
    ));
}

#[test]
fn test_out_of_bounds_access() {
    let mut buf = ImageBuffer::new(4, 3, L(0)).unwrap();
    assert!(buf.get_pixel(3, 2).is_ok());
    assert_eq!(
        buf.get_pixel(4, 0).unwrap_err(),
        Error::OutOfBounds { x: 4, y: 0, width: 4, height: 3 }
    );
    assert_eq!(
        buf.set_pixel(0, 3, L(1)).unwrap_err(),
        Error::OutOfBounds { x: 0, y: 3, width: 4, height: 3 }
    );
}

#[test]
fn test_set_pixel_leaves_others_unchanged() {
    let mut buf = ImageBuffer::new(5, 5, Rgb::new(1, 2, 3)).unwrap();
    buf.set_pixel(2, 3, Rgb::new(9, 9, 9)).unwrap();
    for y in 0..5 {
        for x in 0..5 {
            let expected = if (x, y) == (2, 3) {
                Rgb::new(9, 9, 9)
            } else {
                Rgb::new(1, 2, 3)
            };
            assert_eq!(buf.get_pixel(x, y).unwrap(), expected);
        }
    }
}

#[test]
fn test_pixels_row_major_and_restartable() {
    let buf = ImageBuffer::from_fn(3, 2, |x, y| L((y * 3 + x) as u8)).unwrap();
    let first: Vec<u8> = buf.pixels().map(|p| p.0).collect();
    assert_eq!(first, vec![0, 1, 2, 3, 4, 5]);
    // A second traversal observes the same sequence
    let second: Vec<u8> = buf.pixels().map(|p| p.0).collect();
    assert_eq!(first, second);
}

#[test]
fn test_dynamic_set_pixel_converts() {
    let mut image = Image::new(2, 2, Dynamic::from_luma(10)).unwrap();
    image.set_pixel(0, 0, Dynamic::from_rgb(255, 255, 255)).unwrap();
    assert_eq!(image.get_pixel(0, 0).unwrap(), Dynamic::from_luma(255));
    assert_eq!(image.color_type(), ColorType::L);
}

#[test]
fn test_pixel_conversions() {
    let grey = Dynamic::from_luma(80);
    assert_eq!(grey.convert(ColorType::Rgb), Dynamic::from_rgb(80, 80, 80));
    // Grey values survive a round-trip through RGB
    assert_eq!(grey.convert(ColorType::Rgb).convert(ColorType::L), grey);
    // Absent alpha becomes fully opaque
    assert_eq!(
        Dynamic::from_rgb(1, 2, 3).convert(ColorType::Rgba),
        Dynamic::from_rgba(1, 2, 3, 255)
    );
}

#[test]
fn test_static_decode_as_sequence_yields_one_frame() {
    let image = Image::new(4, 4, Dynamic::from_rgb(10, 20, 30)).unwrap();
    let bytes = image.encode_to_vec(ImageFormat::Png).unwrap();
    let sequence = ImageSequence::from_bytes_inferred(&bytes).unwrap();
    assert_eq!(sequence.len(), 1);
    assert_eq!(sequence.get(0).unwrap().delay(), Duration::ZERO);
    assert_eq!(sequence.get(0).unwrap().image().dimensions(), (4, 4));
}

#[test]
fn test_sequence_encode_unsupported_for_static_formats() {
    let image = Image::new(2, 2, Dynamic::from_rgb(0, 0, 0)).unwrap();
    let sequence = ImageSequence::from_frames(vec![Frame::from_image(image)]);
    for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp] {
        assert!(matches!(
            sequence.encode_to_vec(format),
            Err(Error::UnsupportedFeature { .. })
        ));
    }
}

#[test]
fn test_animated_gif_decode_scenario() {
    // Three solid frames on a 256x256 canvas with known reference colors
    let colors = [
        Rgba::new(200, 30, 30, 255),
        Rgba::new(30, 200, 30, 255),
        Rgba::new(30, 30, 200, 255),
    ];
    let mut sequence = ImageSequence::new().with_loop_count(LoopCount::Exactly(2));
    for (i, color) in colors.iter().enumerate() {
        let buf = ImageBuffer::new(256, 256, *color).unwrap();
        sequence.push(
            Frame::from_image(buf.into())
                .with_delay(Duration::from_millis(40 * (i as u64 + 1)))
                .with_disposal(DisposalMethod::None),
        );
    }

    let bytes = sequence.encode_to_vec(ImageFormat::Gif).unwrap();
    let decoded = ImageSequence::from_bytes_inferred(&bytes).unwrap();

    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded.loop_count(), LoopCount::Exactly(2));
    for (i, frame) in decoded.iter().enumerate() {
        assert_eq!(frame.image().dimensions(), (256, 256));
        assert_eq!(
            frame.image().get_pixel(0, 0).unwrap(),
            Dynamic::Rgba(colors[i]),
            "frame {i} reference pixel"
        );
        assert_eq!(frame.delay(), Duration::from_millis(40 * (i as u64 + 1)));
    }
}

#[test]
fn test_gif_frame_iteration_restartable() {
    let frame =
        |v: u8| Frame::from_image(Image::new(8, 8, Dynamic::from_rgba(v, 0, 0, 255)).unwrap());
    let sequence = ImageSequence::from_frames(vec![frame(1), frame(2), frame(3)]);
    let bytes = sequence.encode_to_vec(ImageFormat::Gif).unwrap();
    let decoded = ImageSequence::from_bytes(ImageFormat::Gif, &bytes).unwrap();

    let reds_a: Vec<u8> = decoded
        .iter()
        .map(|f| f.image().get_pixel(0, 0).unwrap().into_rgba().r)
        .collect();
    let reds_b: Vec<u8> = decoded
        .iter()
        .map(|f| f.image().get_pixel(0, 0).unwrap().into_rgba().r)
        .collect();
    assert_eq!(reds_a, vec![1, 2, 3]);
    assert_eq!(reds_a, reds_b);
}

#[test]
fn test_truncated_png_reports_truncation() {
    let image = Image::new(8, 8, Dynamic::from_rgb(1, 2, 3)).unwrap();
    let bytes = image.encode_to_vec(ImageFormat::Png).unwrap();
    let err = Image::from_bytes(ImageFormat::Png, &bytes[..12]).unwrap_err();
    assert!(err.is_truncation(), "got {err:?}");
}

#[test]
fn test_corrupt_png_crc_names_section() {
    let image = Image::new(8, 8, Dynamic::from_rgb(1, 2, 3)).unwrap();
    let mut bytes = image.encode_to_vec(ImageFormat::Png).unwrap();
    // Flip a bit inside the IHDR payload without fixing the CRC
    bytes[16] ^= 0x01;
    match Image::from_bytes(ImageFormat::Png, &bytes).unwrap_err() {
        Error::CorruptData { section, .. } => assert_eq!(section, "IHDR"),
        other => panic!("expected corrupt data, got {other:?}"),
    }
}

#[test]
fn test_corrupt_gif_block_introducer() {
    let image = Image::new(4, 4, Dynamic::from_rgb(5, 5, 5)).unwrap();
    let mut bytes = image.encode_to_vec(ImageFormat::Gif).unwrap();
    // The first block after the 13-byte header starts the graphic control
    // extension; replace its introducer with a reserved value.
    assert_eq!(bytes[13], 0x21);
    bytes[13] = 0x7F;
    assert!(Image::from_bytes(ImageFormat::Gif, &bytes)
        .unwrap_err()
        .is_corruption());
}

#[test]
fn test_truncated_jpeg_scan() {
    let image = Image::new(16, 16, Dynamic::from_rgb(100, 50, 25)).unwrap();
    let bytes = image.encode_to_vec(ImageFormat::Jpeg).unwrap();
    let err = Image::from_bytes(ImageFormat::Jpeg, &bytes[..bytes.len() / 2]).unwrap_err();
    assert!(err.is_truncation() || err.is_corruption(), "got {err:?}");
}

#[test]
fn test_jpeg_progressive_unsupported() {
    let image = Image::new(8, 8, Dynamic::from_rgb(1, 2, 3)).unwrap();
    let mut bytes = image.encode_to_vec(ImageFormat::Jpeg).unwrap();
    // Rewrite the SOF0 marker to SOF2 (progressive)
    let pos = bytes
        .windows(2)
        .position(|w| w == [0xFF, 0xC0])
        .expect("SOF0 present");
    bytes[pos + 1] = 0xC2;
    assert!(matches!(
        Image::from_bytes(ImageFormat::Jpeg, &bytes).unwrap_err(),
        Error::UnsupportedFeature { format: ImageFormat::Jpeg, .. }
    ));
}

#[test]
fn test_bmp_unsupported_bit_depth() {
    let image = Image::new(4, 4, Dynamic::from_rgb(1, 2, 3)).unwrap();
    let mut bytes = image.encode_to_vec(ImageFormat::Bmp).unwrap();
    // Bits-per-pixel field lives at offset 28 in the two headers
    bytes[28] = 4;
    assert!(matches!(
        Image::from_bytes(ImageFormat::Bmp, &bytes).unwrap_err(),
        Error::UnsupportedFeature { format: ImageFormat::Bmp, .. }
    ));
}

#[test]
fn test_decoded_color_types() {
    let l = Image::new(4, 4, Dynamic::from_luma(9)).unwrap();
    let rgba = Image::new(4, 4, Dynamic::from_rgba(9, 9, 9, 9)).unwrap();

    let png_l = Image::from_bytes_inferred(&l.encode_to_vec(ImageFormat::Png).unwrap()).unwrap();
    assert_eq!(png_l.color_type(), ColorType::L);

    let png_rgba =
        Image::from_bytes_inferred(&rgba.encode_to_vec(ImageFormat::Png).unwrap()).unwrap();
    assert_eq!(png_rgba.color_type(), ColorType::Rgba);

    let jpeg_l = Image::from_bytes_inferred(&l.encode_to_vec(ImageFormat::Jpeg).unwrap()).unwrap();
    assert_eq!(jpeg_l.color_type(), ColorType::L);

    let bmp_l = Image::from_bytes_inferred(&l.encode_to_vec(ImageFormat::Bmp).unwrap()).unwrap();
    assert_eq!(bmp_l.color_type(), ColorType::L);
}

#[test]
fn test_gif_disposal_metadata_survives() {
    let full = ImageBuffer::new(4, 4, Rgba::new(255, 0, 0, 255)).unwrap();
    let dot = ImageBuffer::new(4, 4, Rgba::new(0, 255, 0, 255)).unwrap();
    let last = ImageBuffer::new(4, 4, Rgba::new(0, 0, 255, 255)).unwrap();

    let sequence = ImageSequence::from_frames(vec![
        Frame::from_image(full.into()).with_disposal(DisposalMethod::Background),
        Frame::from_image(dot.into()).with_disposal(DisposalMethod::None),
        Frame::from_image(last.into()),
    ]);
    let bytes = sequence.encode_to_vec(ImageFormat::Gif).unwrap();
    let decoded = ImageSequence::from_bytes(ImageFormat::Gif, &bytes).unwrap();
    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded.get(0).unwrap().disposal(), DisposalMethod::Background);
    assert_eq!(decoded.get(1).unwrap().disposal(), DisposalMethod::None);
    // Each frame covers the whole canvas, so every composited frame shows
    // its own color regardless of the previous frame's disposal.
    assert_eq!(
        decoded.get(2).unwrap().image().get_pixel(3, 3).unwrap(),
        Dynamic::from_rgba(0, 0, 255, 255)
    );
}

#[test]
fn test_sequence_append_and_index() {
    let mut sequence = ImageSequence::new();
    assert!(sequence.is_empty());
    sequence.push(Frame::from_image(
        Image::new(2, 2, Dynamic::from_luma(1)).unwrap(),
    ));
    sequence.push(Frame::from_image(
        Image::new(2, 2, Dynamic::from_luma(2)).unwrap(),
    ));
    assert_eq!(sequence.len(), 2);
    assert_eq!(
        sequence.get(1).unwrap().image().get_pixel(0, 0).unwrap(),
        Dynamic::from_luma(2)
    );
    assert!(sequence.get(2).is_none());
}
