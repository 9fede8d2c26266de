use std::fmt;

use crate::error::{Error, Result};

/// Magic bytes for PNG files
pub const PNG_SIGNATURE: &[u8; 8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Signatures for the two published GIF versions
pub const GIF87A_SIGNATURE: &[u8; 6] = b"GIF87a";
pub const GIF89A_SIGNATURE: &[u8; 6] = b"GIF89a";

/// JPEG start-of-image marker
pub const JPEG_SIGNATURE: &[u8; 2] = &[0xFF, 0xD8];

/// BMP file header magic
pub const BMP_SIGNATURE: &[u8; 2] = b"BM";

/// A supported image container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Gif,
    Jpeg,
    Bmp,
}

/// Maps a format to the byte signatures that identify it.
///
/// Registered in [`CODECS`] in fixed priority order; detection walks the
/// table deterministically and the first full signature match wins.
#[derive(Debug, Clone, Copy)]
pub struct CodecDescriptor {
    /// The format this descriptor selects
    pub format: ImageFormat,
    /// Leading byte patterns, any of which identifies the format
    pub signatures: &'static [&'static [u8]],
}

/// The codec registry.
///
/// Longer, more specific signatures come first. None of the registered
/// signatures is a prefix of another, so table order alone resolves every
/// stream unambiguously.
pub const CODECS: &[CodecDescriptor] = &[
    CodecDescriptor {
        format: ImageFormat::Png,
        signatures: &[PNG_SIGNATURE],
    },
    CodecDescriptor {
        format: ImageFormat::Gif,
        signatures: &[GIF87A_SIGNATURE, GIF89A_SIGNATURE],
    },
    CodecDescriptor {
        format: ImageFormat::Jpeg,
        signatures: &[JPEG_SIGNATURE],
    },
    CodecDescriptor {
        format: ImageFormat::Bmp,
        signatures: &[BMP_SIGNATURE],
    },
];

/// Length of the shortest registered signature
pub const MIN_SIGNATURE_LEN: usize = 2;

impl ImageFormat {
    /// Identify the format of a byte stream from its leading bytes.
    ///
    /// Streams shorter than the shortest registered signature, or that end
    /// mid-signature while agreeing with one, report
    /// [`Error::TruncatedInput`]; streams matching no registered signature
    /// report [`Error::UnrecognizedFormat`].
    pub fn detect(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_SIGNATURE_LEN {
            return Err(Error::TruncatedInput {
                section: "format signature",
            });
        }

        for descriptor in CODECS {
            for signature in descriptor.signatures {
                if bytes.len() >= signature.len() && &bytes[..signature.len()] == *signature {
                    return Ok(descriptor.format);
                }
            }
        }

        // The stream agrees with the head of some longer signature but ends
        // before completing it.
        for descriptor in CODECS {
            for signature in descriptor.signatures {
                if bytes.len() < signature.len() && signature.starts_with(bytes) {
                    return Err(Error::TruncatedInput {
                        section: "format signature",
                    });
                }
            }
        }

        Err(Error::UnrecognizedFormat)
    }

    /// Look up a format by file extension, ASCII case-insensitive
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "gif" => Ok(Self::Gif),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "bmp" | "dib" => Ok(Self::Bmp),
            other => Err(Error::UnknownExtension(other.to_string())),
        }
    }

    /// Whether the format can carry more than one frame
    pub const fn supports_animation(self) -> bool {
        matches!(self, Self::Gif)
    }

    /// Canonical file extension for this format
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Jpeg => "jpg",
            Self::Bmp => "bmp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => f.write_str("PNG"),
            Self::Gif => f.write_str("GIF"),
            Self::Jpeg => f.write_str("JPEG"),
            Self::Bmp => f.write_str("BMP"),
        }
    }
}
