use crate::error::{Error, Result};
use crate::pixel::{ColorType, Dynamic, Pixel, Rgba, L, La, Rgb};

/// An owned, fixed-size, row-major grid of pixels of one encoding.
///
/// The backing storage is a single contiguous allocation with
/// `data.len() == width * height`; width and height are immutable for the
/// life of the buffer and every coordinate access is bounds-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer<P: Pixel> {
    width: u32,
    height: u32,
    data: Vec<P>,
}

impl<P: Pixel> ImageBuffer<P> {
    /// Create a buffer with every pixel set to `fill`.
    ///
    /// Fails with [`Error::InvalidDimensions`] if either extent is zero,
    /// exceeds [`crate::MAX_DIMENSION`], or `width * height` overflows the
    /// addressable size.
    pub fn new(width: u32, height: u32, fill: P) -> Result<Self> {
        let len = checked_len(width, height)?;
        Ok(Self {
            width,
            height,
            data: vec![fill; len],
        })
    }

    /// Create a buffer by evaluating `f` at every (x, y) in row-major order
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> P) -> Result<Self> {
        let len = checked_len(width, height)?;
        let mut data = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Shape a flat row-major pixel sequence into a buffer of the given width.
    ///
    /// The sequence length must be a positive multiple of `width`.
    pub fn from_pixels(width: u32, pixels: Vec<P>) -> Result<Self> {
        if width == 0 || pixels.is_empty() || pixels.len() % width as usize != 0 {
            return Err(Error::InvalidDimensions {
                width,
                height: (pixels.len() / width.max(1) as usize) as u32,
            });
        }
        let height = (pixels.len() / width as usize) as u32;
        Ok(Self {
            width,
            height,
            data: pixels,
        })
    }

    /// Buffer width in pixels
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height in pixels
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// (width, height) pair
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Total number of pixels
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn index(&self, x: u32, y: u32) -> Result<usize> {
        if x >= self.width || y >= self.height {
            return Err(Error::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(y as usize * self.width as usize + x as usize)
    }

    /// Pixel at (x, y), or [`Error::OutOfBounds`]
    pub fn get_pixel(&self, x: u32, y: u32) -> Result<P> {
        Ok(self.data[self.index(x, y)?])
    }

    /// Replace the pixel at (x, y), or [`Error::OutOfBounds`]
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: P) -> Result<()> {
        let idx = self.index(x, y)?;
        self.data[idx] = pixel;
        Ok(())
    }

    /// Restartable iterator over all pixels in row-major order
    pub fn pixels(&self) -> impl Iterator<Item = P> + '_ {
        self.data.iter().copied()
    }

    /// Iterator over scanlines, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[P]> {
        self.data.chunks_exact(self.width as usize)
    }

    /// Mutable iterator over scanlines, top to bottom
    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [P]> {
        self.data.chunks_exact_mut(self.width as usize)
    }

    /// Flat pixel storage in row-major order
    pub fn as_pixels(&self) -> &[P] {
        &self.data
    }

    pub(crate) fn as_pixels_mut(&mut self) -> &mut [P] {
        &mut self.data
    }

    /// Raw channel bytes in row-major order, without copying
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Set every pixel to `fill`
    pub fn fill(&mut self, fill: P) {
        self.data.fill(fill);
    }

    /// Apply `f` to every pixel in place
    pub fn map_pixels(&mut self, mut f: impl FnMut(P) -> P) {
        for pixel in &mut self.data {
            *pixel = f(*pixel);
        }
    }

    /// Convert the whole buffer to another encoding
    pub fn convert<Q: Pixel>(&self) -> ImageBuffer<Q> {
        ImageBuffer {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .map(|p| Q::from_rgba(p.into_rgba()))
                .collect(),
        }
    }
}

fn checked_len(width: u32, height: u32) -> Result<usize> {
    let err = Error::InvalidDimensions { width, height };
    if width == 0 || height == 0 || width > crate::MAX_DIMENSION || height > crate::MAX_DIMENSION {
        return Err(err);
    }
    (width as usize).checked_mul(height as usize).ok_or(err)
}

macro_rules! dispatch {
    ($image:expr, $buf:pat => $body:expr) => {
        match $image {
            Image::L($buf) => $body,
            Image::La($buf) => $body,
            Image::Rgb($buf) => $body,
            Image::Rgba($buf) => $body,
        }
    };
}

/// A decoded image: one buffer, tagged with its pixel encoding.
///
/// The encoding is resolved once per buffer; per-pixel access through this
/// type converts at the boundary via [`Dynamic`], while the typed
/// [`ImageBuffer`] variants stay available for hot paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Image {
    L(ImageBuffer<L>),
    La(ImageBuffer<La>),
    Rgb(ImageBuffer<Rgb>),
    Rgba(ImageBuffer<Rgba>),
}

impl Image {
    /// Create an image filled with `fill`, encoded per the fill's tag
    pub fn new(width: u32, height: u32, fill: Dynamic) -> Result<Self> {
        Ok(match fill {
            Dynamic::L(p) => Self::L(ImageBuffer::new(width, height, p)?),
            Dynamic::La(p) => Self::La(ImageBuffer::new(width, height, p)?),
            Dynamic::Rgb(p) => Self::Rgb(ImageBuffer::new(width, height, p)?),
            Dynamic::Rgba(p) => Self::Rgba(ImageBuffer::new(width, height, p)?),
        })
    }

    /// The pixel encoding of this image
    pub const fn color_type(&self) -> ColorType {
        match self {
            Self::L(_) => ColorType::L,
            Self::La(_) => ColorType::La,
            Self::Rgb(_) => ColorType::Rgb,
            Self::Rgba(_) => ColorType::Rgba,
        }
    }

    pub fn width(&self) -> u32 {
        dispatch!(self, buf => buf.width())
    }

    pub fn height(&self) -> u32 {
        dispatch!(self, buf => buf.height())
    }

    /// (width, height) pair
    pub fn dimensions(&self) -> (u32, u32) {
        dispatch!(self, buf => buf.dimensions())
    }

    /// Total number of pixels
    pub fn len(&self) -> usize {
        dispatch!(self, buf => buf.len())
    }

    pub fn is_empty(&self) -> bool {
        dispatch!(self, buf => buf.is_empty())
    }

    /// Tagged pixel at (x, y), or [`Error::OutOfBounds`]
    pub fn get_pixel(&self, x: u32, y: u32) -> Result<Dynamic> {
        dispatch!(self, buf => Ok(buf.get_pixel(x, y)?.into_dynamic()))
    }

    /// Replace the pixel at (x, y).
    ///
    /// The supplied pixel is converted to this image's encoding first; this
    /// is the explicit conversion point for dynamically typed callers.
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Dynamic) -> Result<()> {
        dispatch!(self, buf => buf.set_pixel(x, y, Pixel::from_dynamic(pixel)))
    }

    /// Restartable iterator over all pixels in row-major order
    pub fn pixels(&self) -> Box<dyn Iterator<Item = Dynamic> + '_> {
        dispatch!(self, buf => Box::new(buf.pixels().map(Pixel::into_dynamic)))
    }

    /// Convert to another encoding, returning a new image
    pub fn convert_to(&self, target: ColorType) -> Self {
        match target {
            ColorType::L => Self::L(dispatch!(self, buf => buf.convert())),
            ColorType::La => Self::La(dispatch!(self, buf => buf.convert())),
            ColorType::Rgb => Self::Rgb(dispatch!(self, buf => buf.convert())),
            ColorType::Rgba => Self::Rgba(dispatch!(self, buf => buf.convert())),
        }
    }

    /// Copy out an RGBA rendition of this image
    pub fn to_rgba_buffer(&self) -> ImageBuffer<Rgba> {
        match self {
            Self::Rgba(buf) => buf.clone(),
            other => dispatch!(other, buf => buf.convert()),
        }
    }

    /// Raw channel bytes in row-major order
    pub fn as_bytes(&self) -> &[u8] {
        dispatch!(self, buf => buf.as_bytes())
    }
}

impl From<ImageBuffer<L>> for Image {
    fn from(buf: ImageBuffer<L>) -> Self {
        Self::L(buf)
    }
}

impl From<ImageBuffer<La>> for Image {
    fn from(buf: ImageBuffer<La>) -> Self {
        Self::La(buf)
    }
}

impl From<ImageBuffer<Rgb>> for Image {
    fn from(buf: ImageBuffer<Rgb>) -> Self {
        Self::Rgb(buf)
    }
}

impl From<ImageBuffer<Rgba>> for Image {
    fn from(buf: ImageBuffer<Rgba>) -> Self {
        Self::Rgba(buf)
    }
}
