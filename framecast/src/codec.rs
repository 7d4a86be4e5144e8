//! Image codec seam
//!
//! The sender compresses each captured image into an opaque payload; the
//! receiver turns payloads back into images. Framing never looks inside.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Converts between images and compressed payloads
pub trait FrameCodec {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<u8>, CodecError>;

    fn decode(&mut self, payload: &[u8]) -> Result<RgbImage, CodecError>;
}

/// Baseline JPEG via the `image` crate
#[derive(Debug, Clone)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    /// `quality` is clamped to 1..=100
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(crate::config::JPEG_QUALITY)
    }
}

impl FrameCodec for JpegCodec {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<u8>, CodecError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CodecError::Encode("empty image".to_string()));
        }
        let mut out = Vec::with_capacity(64 * 1024);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(image)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(out)
    }

    fn decode(&mut self, payload: &[u8]) -> Result<RgbImage, CodecError> {
        if payload.is_empty() {
            return Err(CodecError::Decode("empty payload".to_string()));
        }
        image::load_from_memory_with_format(payload, ImageFormat::Jpeg)
            .map(|img| img.into_rgb8())
            .map_err(|e| CodecError::Decode(e.to_string()))
    }
}
