//! Format codecs.
//!
//! One sub-module per supported container. Dispatch is a closed `match`
//! over [`ImageFormat`]: adding a format means adding a descriptor to the
//! registry table and an arm here, so signature ambiguity stays reviewable.

pub mod bmp;
pub mod gif;
pub mod jpeg;
pub mod png;
mod reader;

pub(crate) use reader::ByteReader;

use crate::buffer::Image;
use crate::error::{Error, Result};
use crate::format::ImageFormat;
use crate::sequence::{Frame, ImageSequence};

/// Translates raw bytes of one container format into images
pub trait ImageDecoder {
    /// The format this decoder understands
    fn format(&self) -> ImageFormat;

    /// Decode a single image. For animated sources this is the first frame.
    fn decode(&self, data: &[u8]) -> Result<Image>;

    /// Decode every frame. Static formats yield one zero-delay frame.
    fn decode_sequence(&self, data: &[u8]) -> Result<ImageSequence> {
        let image = self.decode(data)?;
        Ok(ImageSequence::from_frames(vec![Frame::from_image(image)]))
    }
}

/// Translates images into raw bytes of one container format
pub trait ImageEncoder {
    /// The format this encoder produces
    fn format(&self) -> ImageFormat;

    /// Encode a single image
    fn encode(&self, image: &Image, out: &mut Vec<u8>) -> Result<()>;

    /// Encode an animation. Only formats that carry frames implement this.
    fn encode_sequence(&self, sequence: &ImageSequence, out: &mut Vec<u8>) -> Result<()> {
        let _ = (sequence, out);
        Err(Error::unsupported(self.format(), "animated sequences"))
    }
}

/// Decode `data` as the given format
pub fn decode_bytes(format: ImageFormat, data: &[u8]) -> Result<Image> {
    log::debug!("decoding {} bytes as {}", data.len(), format);
    match format {
        ImageFormat::Png => png::PngCodec.decode(data),
        ImageFormat::Gif => gif::GifCodec.decode(data),
        ImageFormat::Jpeg => jpeg::JpegCodec::default().decode(data),
        ImageFormat::Bmp => bmp::BmpCodec.decode(data),
    }
}

/// Decode every frame of `data` as the given format
pub fn decode_sequence_bytes(format: ImageFormat, data: &[u8]) -> Result<ImageSequence> {
    log::debug!("decoding {} bytes as an {} sequence", data.len(), format);
    match format {
        ImageFormat::Png => png::PngCodec.decode_sequence(data),
        ImageFormat::Gif => gif::GifCodec.decode_sequence(data),
        ImageFormat::Jpeg => jpeg::JpegCodec::default().decode_sequence(data),
        ImageFormat::Bmp => bmp::BmpCodec.decode_sequence(data),
    }
}

/// Encode `image` into the given format
pub fn encode_bytes(format: ImageFormat, image: &Image, out: &mut Vec<u8>) -> Result<()> {
    match format {
        ImageFormat::Png => png::PngCodec.encode(image, out),
        ImageFormat::Gif => gif::GifCodec.encode(image, out),
        ImageFormat::Jpeg => jpeg::JpegCodec::default().encode(image, out),
        ImageFormat::Bmp => bmp::BmpCodec.encode(image, out),
    }
}

/// Encode `sequence` into the given format
pub fn encode_sequence_bytes(
    format: ImageFormat,
    sequence: &ImageSequence,
    out: &mut Vec<u8>,
) -> Result<()> {
    match format {
        ImageFormat::Png => png::PngCodec.encode_sequence(sequence, out),
        ImageFormat::Gif => gif::GifCodec.encode_sequence(sequence, out),
        ImageFormat::Jpeg => jpeg::JpegCodec::default().encode_sequence(sequence, out),
        ImageFormat::Bmp => bmp::BmpCodec.encode_sequence(sequence, out),
    }
}

impl Image {
    /// Decode an image from raw bytes of an explicitly given format
    pub fn from_bytes(format: ImageFormat, data: &[u8]) -> Result<Self> {
        decode_bytes(format, data)
    }

    /// Sniff the format from the leading bytes, then decode
    pub fn from_bytes_inferred(data: &[u8]) -> Result<Self> {
        decode_bytes(ImageFormat::detect(data)?, data)
    }

    /// Encode this image, appending the container bytes to `out`
    pub fn encode(&self, format: ImageFormat, out: &mut Vec<u8>) -> Result<()> {
        encode_bytes(format, self, out)
    }

    /// Encode this image into a fresh byte vector
    pub fn encode_to_vec(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode(format, &mut out)?;
        Ok(out)
    }
}

impl ImageSequence {
    /// Decode an animation from raw bytes of an explicitly given format
    pub fn from_bytes(format: ImageFormat, data: &[u8]) -> Result<Self> {
        decode_sequence_bytes(format, data)
    }

    /// Sniff the format from the leading bytes, then decode every frame
    pub fn from_bytes_inferred(data: &[u8]) -> Result<Self> {
        decode_sequence_bytes(ImageFormat::detect(data)?, data)
    }

    /// Encode this sequence, appending the container bytes to `out`
    pub fn encode(&self, format: ImageFormat, out: &mut Vec<u8>) -> Result<()> {
        encode_sequence_bytes(format, self, out)
    }

    /// Encode this sequence into a fresh byte vector
    pub fn encode_to_vec(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode(format, &mut out)?;
        Ok(out)
    }
}
