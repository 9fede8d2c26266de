use thiserror::Error;

use crate::format::ImageFormat;

/// Result type for imago operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with images
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("coordinates ({x}, {y}) out of bounds for a {width}x{height} image")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("no registered codec signature matched the input")]
    UnrecognizedFormat,

    #[error("truncated input in {section}")]
    TruncatedInput { section: &'static str },

    #[error("corrupt {section}: {detail}")]
    CorruptData {
        section: &'static str,
        detail: String,
    },

    #[error("{format} feature not supported: {feature}")]
    UnsupportedFeature {
        format: ImageFormat,
        feature: String,
    },

    #[error("unknown image file extension: {0}")]
    UnknownExtension(String),

    #[error("encoding failed: {0}")]
    EncodingError(String),
}

impl Error {
    pub(crate) fn corrupt(section: &'static str, detail: impl Into<String>) -> Self {
        Self::CorruptData {
            section,
            detail: detail.into(),
        }
    }

    pub(crate) fn unsupported(format: ImageFormat, feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            format,
            feature: feature.into(),
        }
    }

    /// Returns true if the input ended before the structure it promised
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::TruncatedInput { .. })
    }

    /// Returns true if a recognized container violated its own grammar
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptData { .. })
    }
}
