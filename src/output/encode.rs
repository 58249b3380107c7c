use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

use crate::error::EncodeError;
use crate::frame::{ColorImage, PixelFormat};

/// JPEG compression of color frames before publication
#[derive(Debug, Clone)]
pub struct ImageEncoder {
    quality: u8,
}

impl ImageEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode_jpeg(&self, image: &ColorImage) -> Result<Vec<u8>, EncodeError> {
        if !image.validate_size() {
            return Err(EncodeError::BufferSize {
                width: image.width,
                height: image.height,
                actual: image.data.len(),
            });
        }

        let rgb: std::borrow::Cow<'_, [u8]> = match image.format {
            PixelFormat::Rgb8 => std::borrow::Cow::Borrowed(image.data.as_slice()),
            PixelFormat::Bgr8 => std::borrow::Cow::Owned(
                image
                    .data
                    .chunks_exact(3)
                    .flat_map(|px| [px[2], px[1], px[0]])
                    .collect(),
            ),
        };

        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
        encoder
            .encode(&rgb, image.width, image.height, ColorType::Rgb8)
            .map_err(|e| EncodeError::Jpeg {
                details: e.to_string(),
            })?;

        Ok(buf)
    }
}
