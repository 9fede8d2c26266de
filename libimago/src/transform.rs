//! Whole-image transforms.
//!
//! Buffers never resize implicitly: `crop` and `resized` return new
//! buffers, while flips, inversion, pasting and masking mutate in place
//! without changing the extent.

use crate::buffer::{Image, ImageBuffer};
use crate::error::{Error, Result};
use crate::pixel::{ColorType, Pixel, Rgba, L, La, Rgb};

/// Interpolation used when resampling an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeFilter {
    /// Nearest neighbor; fastest, blocky on upscale
    Nearest,
    /// Linear interpolation over the four nearest pixels
    #[default]
    Bilinear,
}

impl<P: Pixel> ImageBuffer<P> {
    /// Copy out the rectangle with corners (x1, y1) and (x2, y2).
    ///
    /// The lower-right corner is exclusive and clamped to the buffer
    /// extent; an empty intersection is [`Error::InvalidDimensions`].
    pub fn crop(&self, x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self> {
        let x2 = x2.min(self.width());
        let y2 = y2.min(self.height());
        if x1 >= x2 || y1 >= y2 {
            return Err(Error::InvalidDimensions {
                width: x2.saturating_sub(x1),
                height: y2.saturating_sub(y1),
            });
        }
        let stride = self.width() as usize;
        let source = self.as_pixels();
        Self::from_fn(x2 - x1, y2 - y1, |x, y| {
            source[(y1 + y) as usize * stride + (x1 + x) as usize]
        })
    }

    /// Resample to the given dimensions, returning a new buffer
    pub fn resized(&self, width: u32, height: u32, filter: ResizeFilter) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        let (sw, sh) = self.dimensions();
        let stride = sw as usize;
        let source = self.as_pixels();
        match filter {
            ResizeFilter::Nearest => Self::from_fn(width, height, |x, y| {
                let sx = (u64::from(x) * u64::from(sw) / u64::from(width)) as usize;
                let sy = (u64::from(y) * u64::from(sh) / u64::from(height)) as usize;
                source[sy * stride + sx]
            }),
            ResizeFilter::Bilinear => Self::from_fn(width, height, |x, y| {
                // Center-aligned source coordinates
                let fx = ((f64::from(x) + 0.5) * f64::from(sw) / f64::from(width) - 0.5)
                    .clamp(0.0, f64::from(sw - 1));
                let fy = ((f64::from(y) + 0.5) * f64::from(sh) / f64::from(height) - 0.5)
                    .clamp(0.0, f64::from(sh - 1));
                let x0 = fx.floor() as u32;
                let y0 = fy.floor() as u32;
                let x1 = (x0 + 1).min(sw - 1);
                let y1 = (y0 + 1).min(sh - 1);
                let tx = fx - f64::from(x0);
                let ty = fy - f64::from(y0);

                let sample = |x: u32, y: u32| -> Rgba {
                    source[y as usize * stride + x as usize].into_rgba()
                };
                let (p00, p10) = (sample(x0, y0), sample(x1, y0));
                let (p01, p11) = (sample(x0, y1), sample(x1, y1));
                let lerp2 = |c00: u8, c10: u8, c01: u8, c11: u8| -> u8 {
                    let top = f64::from(c00) * (1.0 - tx) + f64::from(c10) * tx;
                    let bottom = f64::from(c01) * (1.0 - tx) + f64::from(c11) * tx;
                    (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8
                };
                P::from_rgba(Rgba::new(
                    lerp2(p00.r, p10.r, p01.r, p11.r),
                    lerp2(p00.g, p10.g, p01.g, p11.g),
                    lerp2(p00.b, p10.b, p01.b, p11.b),
                    lerp2(p00.a, p10.a, p01.a, p11.a),
                ))
            }),
        }
    }

    /// Flip vertically (about the x-axis), in place
    pub fn flip(&mut self) {
        let width = self.width() as usize;
        let data = self.as_pixels_mut();
        let height = data.len() / width;
        for y in 0..height / 2 {
            let (top, rest) = data.split_at_mut((height - 1 - y) * width);
            top[y * width..(y + 1) * width].swap_with_slice(&mut rest[..width]);
        }
    }

    /// Mirror horizontally (about the y-axis), in place
    pub fn mirror(&mut self) {
        for row in self.rows_mut() {
            row.reverse();
        }
    }

    /// Invert every pixel's color channels, in place
    pub fn invert(&mut self) {
        self.map_pixels(Pixel::inverted);
    }

    /// Copy `other` onto this buffer with its top-left corner at (x, y).
    ///
    /// Pixels falling outside this buffer are clipped; existing pixels are
    /// replaced outright.
    pub fn paste(&mut self, x: u32, y: u32, other: &Self) {
        let (width, height) = self.dimensions();
        let rows = other.height().min(height.saturating_sub(y)) as usize;
        let cols = other.width().min(width.saturating_sub(x)) as usize;
        let src_stride = other.width() as usize;
        let dst_stride = width as usize;
        let source = other.as_pixels();
        let target = self.as_pixels_mut();
        for sy in 0..rows {
            let src = sy * src_stride;
            let dst = (y as usize + sy) * dst_stride + x as usize;
            target[dst..dst + cols].copy_from_slice(&source[src..src + cols]);
        }
    }

    /// Alpha-composite `other` onto this buffer at (x, y), clipped
    pub fn overlay(&mut self, x: u32, y: u32, other: &Self) {
        let (width, height) = self.dimensions();
        let rows = other.height().min(height.saturating_sub(y)) as usize;
        let cols = other.width().min(width.saturating_sub(x)) as usize;
        let src_stride = other.width() as usize;
        let dst_stride = width as usize;
        let source = other.as_pixels();
        let target = self.as_pixels_mut();
        for sy in 0..rows {
            for sx in 0..cols {
                let over = source[sy * src_stride + sx].into_rgba();
                let dst = (y as usize + sy) * dst_stride + (x as usize + sx);
                let under = target[dst].into_rgba();
                target[dst] = P::from_rgba(over.over(under));
            }
        }
    }
}

macro_rules! impl_mask_alpha {
    ($pixel:ty, $set:expr) => {
        impl ImageBuffer<$pixel> {
            /// Replace the alpha channel with the luminance of `mask`.
            ///
            /// The mask must have the same dimensions as this buffer.
            pub fn mask_alpha(&mut self, mask: &ImageBuffer<L>) -> Result<()> {
                if mask.dimensions() != self.dimensions() {
                    let (width, height) = mask.dimensions();
                    return Err(Error::InvalidDimensions { width, height });
                }
                let set: fn(&mut $pixel, u8) = $set;
                for (pixel, m) in self.as_pixels_mut().iter_mut().zip(mask.pixels()) {
                    set(pixel, m.value());
                }
                Ok(())
            }
        }
    };
}

impl_mask_alpha!(Rgba, |p, a| p.a = a);
impl_mask_alpha!(La, |p, a| p.a = a);

macro_rules! dispatch_transform {
    ($image:expr, $buf:pat => $body:expr) => {
        match $image {
            Image::L($buf) => $body,
            Image::La($buf) => $body,
            Image::Rgb($buf) => $body,
            Image::Rgba($buf) => $body,
        }
    };
}

impl Image {
    /// Copy out a rectangle; see [`ImageBuffer::crop`]
    pub fn crop(&self, x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self> {
        Ok(match self {
            Self::L(buf) => Self::L(buf.crop(x1, y1, x2, y2)?),
            Self::La(buf) => Self::La(buf.crop(x1, y1, x2, y2)?),
            Self::Rgb(buf) => Self::Rgb(buf.crop(x1, y1, x2, y2)?),
            Self::Rgba(buf) => Self::Rgba(buf.crop(x1, y1, x2, y2)?),
        })
    }

    /// Resample to new dimensions; see [`ImageBuffer::resized`]
    pub fn resized(&self, width: u32, height: u32, filter: ResizeFilter) -> Result<Self> {
        Ok(match self {
            Self::L(buf) => Self::L(buf.resized(width, height, filter)?),
            Self::La(buf) => Self::La(buf.resized(width, height, filter)?),
            Self::Rgb(buf) => Self::Rgb(buf.resized(width, height, filter)?),
            Self::Rgba(buf) => Self::Rgba(buf.resized(width, height, filter)?),
        })
    }

    /// Flip vertically, in place
    pub fn flip(&mut self) {
        dispatch_transform!(self, buf => buf.flip());
    }

    /// Mirror horizontally, in place
    pub fn mirror(&mut self) {
        dispatch_transform!(self, buf => buf.mirror());
    }

    /// Invert color channels, in place
    pub fn invert(&mut self) {
        dispatch_transform!(self, buf => buf.invert());
    }

    /// Paste `other` at (x, y), converting it to this image's encoding
    pub fn paste(&mut self, x: u32, y: u32, other: &Self) {
        match self {
            Self::L(buf) => buf.paste(x, y, &to_buffer::<L>(other)),
            Self::La(buf) => buf.paste(x, y, &to_buffer::<La>(other)),
            Self::Rgb(buf) => buf.paste(x, y, &to_buffer(other)),
            Self::Rgba(buf) => buf.paste(x, y, &to_buffer(other)),
        }
    }

    /// Alpha-composite `other` at (x, y), converting to this encoding
    pub fn overlay(&mut self, x: u32, y: u32, other: &Self) {
        match self {
            Self::L(buf) => buf.overlay(x, y, &to_buffer::<L>(other)),
            Self::La(buf) => buf.overlay(x, y, &to_buffer::<La>(other)),
            Self::Rgb(buf) => buf.overlay(x, y, &to_buffer(other)),
            Self::Rgba(buf) => buf.overlay(x, y, &to_buffer(other)),
        }
    }

    /// Replace the alpha channel with the luminance of `mask`.
    ///
    /// Alpha-less encodings are widened first: L becomes LA and RGB
    /// becomes RGBA.
    pub fn mask_alpha(&mut self, mask: &ImageBuffer<L>) -> Result<()> {
        match self {
            Self::La(buf) => buf.mask_alpha(mask),
            Self::Rgba(buf) => buf.mask_alpha(mask),
            Self::L(_) => {
                let mut widened = self.convert_to(ColorType::La);
                let Image::La(buf) = &mut widened else { unreachable!() };
                buf.mask_alpha(mask)?;
                *self = widened;
                Ok(())
            }
            Self::Rgb(_) => {
                let mut widened = self.convert_to(ColorType::Rgba);
                let Image::Rgba(buf) = &mut widened else { unreachable!() };
                buf.mask_alpha(mask)?;
                *self = widened;
                Ok(())
            }
        }
    }
}

fn to_buffer<P: Pixel>(image: &Image) -> ImageBuffer<P> {
    dispatch_transform!(image, buf => buf.convert())
}

// --- band splitting ---

impl ImageBuffer<Rgb> {
    /// Split into (red, green, blue) luminance bands
    pub fn bands(&self) -> (ImageBuffer<L>, ImageBuffer<L>, ImageBuffer<L>) {
        let band = |f: fn(&Rgb) -> u8| {
            ImageBuffer::from_pixels(
                self.width(),
                self.as_pixels().iter().map(|p| L(f(p))).collect(),
            )
            .expect("band matches source shape")
        };
        (band(|p| p.r), band(|p| p.g), band(|p| p.b))
    }

    /// Recombine (red, green, blue) bands into one buffer
    pub fn from_bands(
        r: &ImageBuffer<L>,
        g: &ImageBuffer<L>,
        b: &ImageBuffer<L>,
    ) -> Result<Self> {
        if r.dimensions() != g.dimensions() || g.dimensions() != b.dimensions() {
            let (width, height) = g.dimensions();
            return Err(Error::InvalidDimensions { width, height });
        }
        ImageBuffer::from_pixels(
            r.width(),
            r.as_pixels()
                .iter()
                .zip(g.as_pixels())
                .zip(b.as_pixels())
                .map(|((r, g), b)| Rgb::new(r.0, g.0, b.0))
                .collect(),
        )
    }
}

impl ImageBuffer<Rgba> {
    /// Split into (red, green, blue, alpha) luminance bands
    pub fn bands(&self) -> (ImageBuffer<L>, ImageBuffer<L>, ImageBuffer<L>, ImageBuffer<L>) {
        let band = |f: fn(&Rgba) -> u8| {
            ImageBuffer::from_pixels(
                self.width(),
                self.as_pixels().iter().map(|p| L(f(p))).collect(),
            )
            .expect("band matches source shape")
        };
        (band(|p| p.r), band(|p| p.g), band(|p| p.b), band(|p| p.a))
    }

    /// Recombine (red, green, blue, alpha) bands into one buffer
    pub fn from_bands(
        r: &ImageBuffer<L>,
        g: &ImageBuffer<L>,
        b: &ImageBuffer<L>,
        a: &ImageBuffer<L>,
    ) -> Result<Self> {
        if r.dimensions() != g.dimensions()
            || g.dimensions() != b.dimensions()
            || b.dimensions() != a.dimensions()
        {
            let (width, height) = a.dimensions();
            return Err(Error::InvalidDimensions { width, height });
        }
        ImageBuffer::from_pixels(
            r.width(),
            r.as_pixels()
                .iter()
                .zip(g.as_pixels())
                .zip(b.as_pixels())
                .zip(a.as_pixels())
                .map(|(((r, g), b), a)| Rgba::new(r.0, g.0, b.0, a.0))
                .collect(),
        )
    }
}
