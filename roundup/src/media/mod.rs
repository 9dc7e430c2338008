//! Image acceptance checks and candidate download.
//!
//! An image is accepted when it fully decodes as PNG, JPEG, GIF or WebP and
//! both sides are at least [`DEFAULT_MIN_DIMENSION`] pixels.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{HttpImageFetcher, ImageUrlSearch, DOWNLOAD_TIMEOUT};

use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
use image::{ImageError, ImageFormat, ImageReader};
use std::io::Cursor;

/// Smallest accepted width and height.
pub const DEFAULT_MIN_DIMENSION: u32 = 100;

/// Decides whether candidate bytes are a usable image.
#[cfg_attr(test, mockall::automock)]
pub trait ImageValidator: Send + Sync {
    /// Returns true if `bytes` should be kept.
    fn validate(&self, bytes: &[u8]) -> bool;
}

/// Format and pixel dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Encoding guessed from the leading bytes.
    pub format: ImageFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Decodes `bytes` completely and reports format and dimensions.
///
/// Truncated or corrupt data fails here even when the header is intact.
pub fn decode_info(bytes: &[u8]) -> Result<ImageInfo, ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format().ok_or_else(|| {
        ImageError::Unsupported(UnsupportedError::from_format_and_kind(
            ImageFormatHint::Unknown,
            UnsupportedErrorKind::Format(ImageFormatHint::Unknown),
        ))
    })?;
    let decoded = reader.decode()?;
    Ok(ImageInfo {
        format,
        width: decoded.width(),
        height: decoded.height(),
    })
}

/// Accepts images that decode cleanly and whose sides meet a minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodingImageValidator {
    min_dimension: u32,
}

impl Default for DecodingImageValidator {
    fn default() -> Self {
        Self {
            min_dimension: DEFAULT_MIN_DIMENSION,
        }
    }
}

impl DecodingImageValidator {
    /// Creates a validator with the default minimum.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum width and height.
    #[must_use]
    pub fn with_min_dimension(mut self, min_dimension: u32) -> Self {
        self.min_dimension = min_dimension;
        self
    }
}

impl ImageValidator for DecodingImageValidator {
    fn validate(&self, bytes: &[u8]) -> bool {
        match decode_info(bytes) {
            Ok(info) => {
                let large_enough =
                    info.width >= self.min_dimension && info.height >= self.min_dimension;
                if !large_enough {
                    tracing::debug!(
                        width = info.width,
                        height = info.height,
                        min = self.min_dimension,
                        "Image candidate too small"
                    );
                }
                large_enough
            }
            Err(e) => {
                tracing::debug!(error = %e, "Image candidate rejected");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{jpeg_bytes as jpeg, png_bytes as png};

    /// Signature plus IHDR only: a valid header with no image data.
    fn header_only_png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
        bytes
    }

    #[test]
    fn test_png_dimensions() {
        let info = decode_info(&png(640, 360)).unwrap();
        assert_eq!(info.format, ImageFormat::Png);
        assert_eq!((info.width, info.height), (640, 360));
    }

    #[test]
    fn test_jpeg_dimensions() {
        let info = decode_info(&jpeg(256, 128)).unwrap();
        assert_eq!(info.format, ImageFormat::Jpeg);
        assert_eq!((info.width, info.height), (256, 128));
    }

    #[test]
    fn test_header_without_image_data_is_rejected() {
        let validator = DecodingImageValidator::new();
        assert!(decode_info(&header_only_png(640, 480)).is_err());
        assert!(!validator.validate(&header_only_png(640, 480)));
    }

    #[test]
    fn test_truncated_image_is_rejected() {
        let full = png(640, 480);
        let validator = DecodingImageValidator::new();
        assert!(validator.validate(&full));
        assert!(!validator.validate(&full[..full.len() / 2]));
    }

    #[test]
    fn test_validator_rejects_small_and_garbage() {
        let validator = DecodingImageValidator::new();
        assert!(validator.validate(&png(100, 100)));
        assert!(!validator.validate(&png(99, 400)));
        assert!(!validator.validate(b"<html>not an image</html>"));
    }

    #[test]
    fn test_validator_min_dimension_configurable() {
        let validator = DecodingImageValidator::new().with_min_dimension(16);
        assert!(validator.validate(&jpeg(32, 16)));
        assert!(!validator.validate(&jpeg(32, 8)));
    }

    #[test]
    fn test_mock_validator() {
        let mut mock = MockImageValidator::new();
        mock.expect_validate().times(2).returning(|bytes| bytes.len() > 3);
        assert!(mock.validate(b"long enough"));
        assert!(!mock.validate(b"no"));
    }
}
