//! Decoded image payloads and the codec used by the disk tier.

use std::{fmt, io::Write, path::Path, sync::Arc};

use image::{
    codecs::{jpeg::JpegEncoder, png::PngEncoder, webp::WebPEncoder},
    ColorType, DynamicImage,
};
use serde::{Deserialize, Serialize};

use crate::{CacheError, Result};

/// A decoded image held by the cache.
///
/// Cloning is cheap: the pixel buffer is shared, so a memory-tier hit hands
/// back the exact value that was inserted.
#[derive(Clone)]
pub struct ImagePayload {
    image: Arc<DynamicImage>,
}

impl ImagePayload {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn color(&self) -> ColorType {
        self.image.color()
    }

    /// Size of the decoded pixel buffer in bytes.
    pub fn byte_count(&self) -> usize {
        self.image.as_bytes().len()
    }

    /// Returns true when both payloads share the same pixel buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }

    /// Encode into `writer` using the given parameters.
    pub fn encode_to<W: Write>(&self, writer: W, params: EncodingParams) -> Result<()> {
        let encoded = match params.format {
            EncodingFormat::Jpeg => {
                // JPEG has no alpha channel.
                let rgb = DynamicImage::ImageRgb8(self.image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(writer, params.quality))
            }
            EncodingFormat::Png => match self.image.color() {
                ColorType::Rgb32F | ColorType::Rgba32F => {
                    DynamicImage::ImageRgba8(self.image.to_rgba8())
                        .write_with_encoder(PngEncoder::new(writer))
                }
                _ => self.image.write_with_encoder(PngEncoder::new(writer)),
            },
            EncodingFormat::WebP => match self.image.color() {
                ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => self
                    .image
                    .write_with_encoder(WebPEncoder::new_lossless(writer)),
                _ => DynamicImage::ImageRgba8(self.image.to_rgba8())
                    .write_with_encoder(WebPEncoder::new_lossless(writer)),
            },
        };

        encoded.map_err(|e| match e {
            image::ImageError::IoError(io) => CacheError::Io(io),
            other => CacheError::Encode {
                message: other.to_string(),
            },
        })
    }

    /// Decode an image file, guessing the format from its contents.
    pub fn decode_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    /// Decode an encoded image held in memory.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).map_err(|e| CacheError::Decode {
            message: e.to_string(),
        })?;
        Ok(Self::new(image))
    }
}

impl From<DynamicImage> for ImagePayload {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

impl PartialEq for ImagePayload {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.width() == other.width()
                && self.height() == other.height()
                && self.color() == other.color()
                && self.image.as_bytes() == other.image.as_bytes())
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("color", &self.color())
            .field("byte_count", &self.byte_count())
            .finish()
    }
}

/// Compressed format used for files written by the disk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    Jpeg,
    Png,
    WebP,
}

impl EncodingFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg => "jpeg",
            EncodingFormat::Png => "png",
            EncodingFormat::WebP => "webp",
        }
    }

    /// Whether the quality setting changes the output of this format.
    pub fn is_lossy(&self) -> bool {
        matches!(self, EncodingFormat::Jpeg)
    }
}

/// Format and quality applied to subsequent disk writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingParams {
    pub format: EncodingFormat,
    /// 0..=100, only meaningful for lossy formats
    pub quality: u8,
}

impl EncodingParams {
    pub const MAX_QUALITY: u8 = 100;

    /// Create parameters, clamping quality into `0..=100`.
    pub fn new(format: EncodingFormat, quality: u8) -> Self {
        Self {
            format,
            quality: quality.min(Self::MAX_QUALITY),
        }
    }
}

impl Default for EncodingParams {
    fn default() -> Self {
        Self::new(EncodingFormat::Jpeg, 90)
    }
}
