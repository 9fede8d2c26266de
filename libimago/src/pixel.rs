use std::fmt;

use bytemuck::{Pod, Zeroable};

// Integer luma weights. They sum to 256 so grey inputs survive an
// RGB round-trip exactly.
const LUMA_R: u32 = 77;
const LUMA_G: u32 = 150;
const LUMA_B: u32 = 29;

/// Tag identifying the channel semantics of a pixel encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorType {
    /// 8-bit luminance
    L,
    /// 8-bit luminance with alpha
    La,
    /// 8-bit red, green, blue
    Rgb,
    /// 8-bit red, green, blue, alpha
    Rgba,
}

impl ColorType {
    /// Number of 8-bit channels in this encoding
    pub const fn channels(self) -> usize {
        match self {
            Self::L => 1,
            Self::La => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    /// Whether the encoding carries an alpha channel
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::La | Self::Rgba)
    }
}

impl fmt::Display for ColorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L => f.write_str("L"),
            Self::La => f.write_str("LA"),
            Self::Rgb => f.write_str("RGB"),
            Self::Rgba => f.write_str("RGBA"),
        }
    }
}

/// A fixed-size pixel encoding.
///
/// The channel count and order are fixed per implementor and the full
/// 0-255 input range is valid, so every constructor and conversion is
/// total. Conversions route through [`Rgba`]; dropping channels is lossy
/// and documented on the relevant encodings.
pub trait Pixel:
    Copy + Clone + PartialEq + Eq + fmt::Debug + Default + Pod + Send + Sync
{
    /// Number of 8-bit channels
    const CHANNELS: usize;
    /// The tag for this encoding
    const COLOR_TYPE: ColorType;

    /// Widen to RGBA. Missing alpha becomes fully opaque.
    fn into_rgba(self) -> Rgba;

    /// Narrow from RGBA following the fixed conversion formulas
    fn from_rgba(pixel: Rgba) -> Self;

    /// Read one pixel from exactly `CHANNELS` bytes
    fn read_bytes(bytes: &[u8]) -> Self;

    /// Append this pixel's `CHANNELS` bytes
    fn write_bytes(self, out: &mut Vec<u8>);

    /// Wrap in the tagged pixel type
    fn into_dynamic(self) -> Dynamic;

    /// Convert from any tagged pixel
    fn from_dynamic(pixel: Dynamic) -> Self {
        Self::from_rgba(pixel.into_rgba())
    }

    /// Weighted luminance of this pixel
    fn luminance(self) -> u8 {
        let Rgba { r, g, b, .. } = self.into_rgba();
        luma(r, g, b)
    }

    /// Invert the color channels, preserving alpha
    fn inverted(self) -> Self;
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((LUMA_R * u32::from(r) + LUMA_G * u32::from(g) + LUMA_B * u32::from(b)) >> 8) as u8
}

/// A luminance pixel: a single channel carrying brightness only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct L(pub u8);

impl L {
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// The luminance value
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// A luminance pixel with an alpha channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct La {
    /// Luminance component
    pub l: u8,
    /// Alpha component
    pub a: u8,
}

impl La {
    pub const fn new(l: u8, a: u8) -> Self {
        Self { l, a }
    }
}

/// An RGB pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Rgb {
    /// Red component
    pub r: u8,
    /// Green component
    pub g: u8,
    /// Blue component
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0)
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255)
    }
}

/// An RGBA pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Rgba {
    /// Red component
    pub r: u8,
    /// Green component
    pub g: u8,
    /// Blue component
    pub b: u8,
    /// Alpha component
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully transparent black
    pub const fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Source-over composite of `self` onto `under`
    pub fn over(self, under: Rgba) -> Rgba {
        if self.a == 255 {
            return self;
        }
        if self.a == 0 {
            return under;
        }
        let sa = u32::from(self.a);
        let da = u32::from(under.a) * (255 - sa) / 255;
        let oa = sa + da;
        if oa == 0 {
            return Rgba::transparent();
        }
        let blend = |s: u8, d: u8| -> u8 {
            ((u32::from(s) * sa + u32::from(d) * da) / oa) as u8
        };
        Rgba {
            r: blend(self.r, under.r),
            g: blend(self.g, under.g),
            b: blend(self.b, under.b),
            a: oa as u8,
        }
    }
}

impl Pixel for L {
    const CHANNELS: usize = 1;
    const COLOR_TYPE: ColorType = ColorType::L;

    fn into_rgba(self) -> Rgba {
        Rgba::new(self.0, self.0, self.0, 255)
    }

    fn from_rgba(pixel: Rgba) -> Self {
        Self(luma(pixel.r, pixel.g, pixel.b))
    }

    fn read_bytes(bytes: &[u8]) -> Self {
        Self(bytes[0])
    }

    fn write_bytes(self, out: &mut Vec<u8>) {
        out.push(self.0);
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::L(self)
    }

    fn luminance(self) -> u8 {
        self.0
    }

    fn inverted(self) -> Self {
        Self(255 - self.0)
    }
}

impl Pixel for La {
    const CHANNELS: usize = 2;
    const COLOR_TYPE: ColorType = ColorType::La;

    fn into_rgba(self) -> Rgba {
        Rgba::new(self.l, self.l, self.l, self.a)
    }

    fn from_rgba(pixel: Rgba) -> Self {
        Self::new(luma(pixel.r, pixel.g, pixel.b), pixel.a)
    }

    fn read_bytes(bytes: &[u8]) -> Self {
        Self::new(bytes[0], bytes[1])
    }

    fn write_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[self.l, self.a]);
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::La(self)
    }

    fn luminance(self) -> u8 {
        self.l
    }

    fn inverted(self) -> Self {
        Self::new(255 - self.l, self.a)
    }
}

impl Pixel for Rgb {
    const CHANNELS: usize = 3;
    const COLOR_TYPE: ColorType = ColorType::Rgb;

    fn into_rgba(self) -> Rgba {
        Rgba::new(self.r, self.g, self.b, 255)
    }

    fn from_rgba(pixel: Rgba) -> Self {
        Self::new(pixel.r, pixel.g, pixel.b)
    }

    fn read_bytes(bytes: &[u8]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }

    fn write_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[self.r, self.g, self.b]);
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Rgb(self)
    }

    fn inverted(self) -> Self {
        Self::new(255 - self.r, 255 - self.g, 255 - self.b)
    }
}

impl Pixel for Rgba {
    const CHANNELS: usize = 4;
    const COLOR_TYPE: ColorType = ColorType::Rgba;

    fn into_rgba(self) -> Rgba {
        self
    }

    fn from_rgba(pixel: Rgba) -> Self {
        pixel
    }

    fn read_bytes(bytes: &[u8]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }

    fn write_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[self.r, self.g, self.b, self.a]);
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Rgba(self)
    }

    fn inverted(self) -> Self {
        Self::new(255 - self.r, 255 - self.g, 255 - self.b, self.a)
    }
}

/// A pixel value tagged with its encoding.
///
/// Buffers never mix encodings; `Dynamic` exists at the API boundary where
/// the encoding of a decoded image is only known at runtime. Conversion
/// between encodings is explicit via [`Dynamic::convert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dynamic {
    L(L),
    La(La),
    Rgb(Rgb),
    Rgba(Rgba),
}

impl Dynamic {
    /// Luminance constructor
    pub const fn from_luma(value: u8) -> Self {
        Self::L(L::new(value))
    }

    /// Luminance-with-alpha constructor
    pub const fn from_luma_alpha(l: u8, a: u8) -> Self {
        Self::La(La::new(l, a))
    }

    /// RGB constructor
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self::Rgb(Rgb::new(r, g, b))
    }

    /// RGBA constructor
    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::Rgba(Rgba::new(r, g, b, a))
    }

    /// The encoding tag of this pixel
    pub const fn color_type(self) -> ColorType {
        match self {
            Self::L(_) => ColorType::L,
            Self::La(_) => ColorType::La,
            Self::Rgb(_) => ColorType::Rgb,
            Self::Rgba(_) => ColorType::Rgba,
        }
    }

    /// Widen to RGBA
    pub fn into_rgba(self) -> Rgba {
        match self {
            Self::L(p) => p.into_rgba(),
            Self::La(p) => p.into_rgba(),
            Self::Rgb(p) => p.into_rgba(),
            Self::Rgba(p) => p,
        }
    }

    /// Convert to another encoding following the fixed pixel formulas.
    ///
    /// RGB to luma is lossy; absent alpha becomes fully opaque.
    pub fn convert(self, target: ColorType) -> Self {
        let rgba = self.into_rgba();
        match target {
            ColorType::L => Self::L(L::from_rgba(rgba)),
            ColorType::La => Self::La(La::from_rgba(rgba)),
            ColorType::Rgb => Self::Rgb(Rgb::from_rgba(rgba)),
            ColorType::Rgba => Self::Rgba(rgba),
        }
    }

    /// Weighted luminance
    pub fn luminance(self) -> u8 {
        match self {
            Self::L(p) => p.luminance(),
            Self::La(p) => p.luminance(),
            Self::Rgb(p) => p.luminance(),
            Self::Rgba(p) => p.luminance(),
        }
    }
}

impl fmt::Display for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L(p) => write!(f, "L({})", p.0),
            Self::La(p) => write!(f, "La({}, {})", p.l, p.a),
            Self::Rgb(p) => write!(f, "Rgb({}, {}, {})", p.r, p.g, p.b),
            Self::Rgba(p) => write!(f, "Rgba({}, {}, {}, {})", p.r, p.g, p.b, p.a),
        }
    }
}

impl From<L> for Dynamic {
    fn from(pixel: L) -> Self {
        Self::L(pixel)
    }
}

impl From<La> for Dynamic {
    fn from(pixel: La) -> Self {
        Self::La(pixel)
    }
}

impl From<Rgb> for Dynamic {
    fn from(pixel: Rgb) -> Self {
        Self::Rgb(pixel)
    }
}

impl From<Rgba> for Dynamic {
    fn from(pixel: Rgba) -> Self {
        Self::Rgba(pixel)
    }
}
