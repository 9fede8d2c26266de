//! Property tests for the buffer laws.

use imago::*;
use proptest::prelude::*;

fn arb_rgba() -> impl Strategy<Value = Rgba> {
    (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>())
        .prop_map(|(r, g, b, a)| Rgba::new(r, g, b, a))
}

proptest! {
    #[test]
    fn new_buffer_reports_dimensions_and_fill(
        width in 1u32..=64,
        height in 1u32..=64,
        fill in arb_rgba(),
    ) {
        let buf = ImageBuffer::new(width, height, fill).unwrap();
        prop_assert_eq!(buf.dimensions(), (width, height));
        for y in 0..height {
            for x in 0..width {
                prop_assert_eq!(buf.get_pixel(x, y).unwrap(), fill);
            }
        }
    }

    #[test]
    fn set_then_get_returns_written_pixel(
        width in 1u32..=32,
        height in 1u32..=32,
        x_seed in any::<u32>(),
        y_seed in any::<u32>(),
        fill in arb_rgba(),
        written in arb_rgba(),
    ) {
        let x = x_seed % width;
        let y = y_seed % height;
        let mut buf = ImageBuffer::new(width, height, fill).unwrap();
        buf.set_pixel(x, y, written).unwrap();
        prop_assert_eq!(buf.get_pixel(x, y).unwrap(), written);
        // Every other pixel still holds the fill value
        for py in 0..height {
            for px in 0..width {
                if (px, py) != (x, y) {
                    prop_assert_eq!(buf.get_pixel(px, py).unwrap(), fill);
                }
            }
        }
    }

    #[test]
    fn pixels_iterates_row_major_exactly_once(
        width in 1u32..=32,
        height in 1u32..=32,
    ) {
        let buf = ImageBuffer::from_fn(width, height, |x, y| {
            L(((y * width + x) % 256) as u8)
        }).unwrap();
        let collected: Vec<L> = buf.pixels().collect();
        prop_assert_eq!(collected.len(), (width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                prop_assert_eq!(
                    collected[(y * width + x) as usize],
                    buf.get_pixel(x, y).unwrap()
                );
            }
        }
    }

    #[test]
    fn out_of_bounds_is_reported_not_clamped(
        width in 1u32..=32,
        height in 1u32..=32,
        beyond in 0u32..=8,
    ) {
        let buf = ImageBuffer::new(width, height, L(0)).unwrap();
        let err = buf.get_pixel(width + beyond, 0).unwrap_err();
        prop_assert_eq!(err, Error::OutOfBounds {
            x: width + beyond,
            y: 0,
            width,
            height,
        });
    }

    #[test]
    fn grey_pixels_survive_rgb_conversion(value in any::<u8>()) {
        let buf = ImageBuffer::new(3, 3, L(value)).unwrap();
        let there_and_back: ImageBuffer<L> = buf.convert::<Rgb>().convert();
        prop_assert_eq!(there_and_back, buf);
    }

    #[test]
    fn crop_dimensions_match_request(
        width in 4u32..=48,
        height in 4u32..=48,
        x1 in 0u32..=2,
        y1 in 0u32..=2,
    ) {
        let buf = ImageBuffer::new(width, height, Rgb::new(5, 6, 7)).unwrap();
        let cropped = buf.crop(x1, y1, width, height).unwrap();
        prop_assert_eq!(cropped.dimensions(), (width - x1, height - y1));
    }

    #[test]
    fn png_roundtrip_preserves_random_rgba(
        width in 1u32..=12,
        height in 1u32..=12,
        seed in any::<u64>(),
    ) {
        // Deterministic pseudo-random pixels from the seed
        let mut state = seed | 1;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        };
        let buf = ImageBuffer::from_fn(width, height, |_, _| {
            Rgba::new(next(), next(), next(), next())
        }).unwrap();
        let image: Image = buf.into();
        let bytes = image.encode_to_vec(ImageFormat::Png).unwrap();
        let decoded = Image::from_bytes_inferred(&bytes).unwrap();
        prop_assert_eq!(decoded, image);
    }
}
