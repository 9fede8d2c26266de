#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! imago - an in-memory raster image engine
//!
//! This library provides the core machinery for working with raster
//! images: a fixed set of pixel encodings, owned row-major image buffers,
//! a deterministic codec registry with byte-signature detection, strict
//! decoders and encoders for PNG, JPEG, GIF and BMP, and frame sequences
//! for animated sources.
//!
//! The engine is synchronous and performs no I/O of its own: callers hand
//! in a byte slice and get back an [`Image`], an [`ImageSequence`] or
//! encoded bytes. Failures are reported as typed [`Error`] values, never
//! as silently substituted pixels.

pub mod buffer;
pub mod codecs;
pub mod draw;
pub mod error;
pub mod format;
pub mod pixel;
pub mod sequence;
pub mod transform;

pub use buffer::{Image, ImageBuffer};
pub use error::{Error, Result};
pub use format::{CodecDescriptor, ImageFormat, CODECS};
pub use pixel::{ColorType, Dynamic, Pixel, Rgba, L, La, Rgb};
pub use sequence::{DisposalMethod, Frame, ImageSequence, LoopCount};
pub use transform::ResizeFilter;

/// Maximum supported image dimension on either axis
pub const MAX_DIMENSION: u32 = 65536;
