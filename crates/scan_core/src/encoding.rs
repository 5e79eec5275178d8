use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageFormat};
use thiserror::Error;

use crate::media::RawFrame;

/// Matches the browser canvas default for `image/jpeg` exports.
pub const CAPTURE_JPEG_QUALITY: u8 = 92;

#[derive(Debug, Error)]
pub enum ImageEncodingError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} RGB")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame has zero area")]
    EmptyFrame,
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Compressed still image held by a scan session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl EncodedImage {
    /// Validates user-supplied bytes by fully decoding them. The original bytes
    /// are kept untouched so the upload is exactly what the user picked.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, image::ImageError> {
        let format = image::guess_format(&bytes)?;
        let decoded = image::load_from_memory_with_format(&bytes, format)?;
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            bytes,
            format,
        })
    }

    pub fn from_frame(frame: &RawFrame) -> Result<Self, ImageEncodingError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(ImageEncodingError::EmptyFrame);
        }
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.pixels.len() != expected {
            return Err(ImageEncodingError::FrameSize {
                width: frame.width,
                height: frame.height,
                expected,
                actual: frame.pixels.len(),
            });
        }

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, CAPTURE_JPEG_QUALITY).encode(
            &frame.pixels,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )?;

        Ok(Self {
            bytes,
            format: ImageFormat::Jpeg,
            width: frame.width,
            height: frame.height,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:` URL suitable for an `<img>` preview.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), STANDARD.encode(&self.bytes))
    }
}
